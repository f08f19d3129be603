//! Coarse "is this a leaf?" check based on the share of green pixels.
//!
//! A pixel counts as green when its 8-bit HSV value lies in
//! `H 25..=90, S 30..=255, V 30..=255` (hue on the halved 0..180 scale).
//! Photos with too few green pixels are rejected before the expensive
//! preprocessing and inference run.

use crate::color::rgb_to_hsv_pixel;
use crate::types::RgbImage;

/// Default minimum green share, in percent, for a photo to count as a
/// leaf. The comparison is strict.
pub const DEFAULT_MIN_GREEN_PERCENT: f64 = 5.0;

const HUE_RANGE: std::ops::RangeInclusive<u8> = 25..=90;
const MIN_SATURATION: u8 = 30;
const MIN_VALUE: u8 = 30;

/// Whether one RGB pixel falls in the leaf-green HSV range.
#[must_use]
pub fn is_green(rgb: [u8; 3]) -> bool {
    let [h, s, v] = rgb_to_hsv_pixel(rgb);
    HUE_RANGE.contains(&h) && s >= MIN_SATURATION && v >= MIN_VALUE
}

/// Percentage of pixels in `image` that are leaf-green. Zero for an
/// empty image.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn green_percent(image: &RgbImage) -> f64 {
    let total = u64::from(image.width()) * u64::from(image.height());
    if total == 0 {
        return 0.0;
    }
    let green = image.pixels().filter(|p| is_green(p.0)).count() as u64;
    green as f64 / total as f64 * 100.0
}

/// Whether a measured green share clears the leaf threshold.
#[must_use]
pub const fn meets_threshold(green_percent: f64, min_green_percent: f64) -> bool {
    green_percent > min_green_percent
}

/// Returns `true` when more than `min_green_percent` of the image is
/// leaf-green.
#[must_use]
pub fn is_leaf(image: &RgbImage, min_green_percent: f64) -> bool {
    meets_threshold(green_percent(image), min_green_percent)
}
