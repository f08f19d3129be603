//! Per-class pixel statistics of a mask.

use serde::{Deserialize, Serialize};

use crate::mask::{Mask, MaskLabel};

/// Label counts and their share of the mask area.
///
/// Percentages are `count / total * 100`. Serialized with camelCase keys
/// (`backgroundPercent`, ...) for JSON consumers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskStats {
    /// Share of background pixels, in percent.
    pub background_percent: f64,
    /// Share of healthy leaf pixels, in percent.
    pub healthy_percent: f64,
    /// Share of diseased pixels, in percent.
    pub diseased_percent: f64,
    /// Number of background pixels.
    pub background_pixels: u64,
    /// Number of healthy leaf pixels.
    pub healthy_pixels: u64,
    /// Number of diseased pixels.
    pub diseased_pixels: u64,
}

impl MaskStats {
    /// Total pixel count.
    #[must_use]
    pub const fn total_pixels(&self) -> u64 {
        self.background_pixels + self.healthy_pixels + self.diseased_pixels
    }

    /// Share of the leaf (healthy + diseased) that is diseased, in
    /// percent. Zero when the mask contains no leaf.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn diseased_leaf_percent(&self) -> f64 {
        let leaf = self.healthy_pixels + self.diseased_pixels;
        if leaf == 0 {
            return 0.0;
        }
        self.diseased_pixels as f64 / leaf as f64 * 100.0
    }
}

/// Count the pixels of each label.
///
/// An empty mask yields all-zero counts and percentages.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn summarize(mask: &Mask) -> MaskStats {
    let mut counts = [0_u64; 3];
    for label in mask.labels() {
        let slot = match label {
            MaskLabel::Background => 0,
            MaskLabel::Healthy => 1,
            MaskLabel::Diseased => 2,
        };
        counts[slot] += 1;
    }

    let total: u64 = counts.iter().sum();
    let percent = |count: u64| {
        if total == 0 {
            0.0
        } else {
            count as f64 / total as f64 * 100.0
        }
    };

    MaskStats {
        background_percent: percent(counts[0]),
        healthy_percent: percent(counts[1]),
        diseased_percent: percent(counts[2]),
        background_pixels: counts[0],
        healthy_pixels: counts[1],
        diseased_pixels: counts[2],
    }
}
