//! Render masks for display.
//!
//! Masks smaller or larger than the photo are brought to the photo's
//! size with [`resize_nearest`] first, so labels are never blended.

use crate::mask::{Mask, MaskLabel, resize_nearest};
use crate::types::{PipelineError, RgbImage};

/// Default opacity of the colored mask in [`overlay`].
pub const DEFAULT_OVERLAY_ALPHA: f32 = 0.4;

/// Display color of a label: background black, healthy green,
/// diseased red.
#[must_use]
pub const fn label_color(label: MaskLabel) -> [u8; 3] {
    match label {
        MaskLabel::Background => [0, 0, 0],
        MaskLabel::Healthy => [0, 255, 0],
        MaskLabel::Diseased => [255, 0, 0],
    }
}

/// Map every mask pixel to its [`label_color`].
#[must_use = "returns the colorized mask"]
pub fn colorize(mask: &Mask) -> RgbImage {
    RgbImage::from_fn(mask.width(), mask.height(), |x, y| {
        image::Rgb(label_color(mask.label(x, y)))
    })
}

fn fit_to(mask: &Mask, image: &RgbImage) -> Result<Mask, PipelineError> {
    resize_nearest(mask, image.width(), image.height())
}

/// Blend the colorized mask over `image`:
/// `round(image * (1 - alpha) + color * alpha)`.
///
/// `alpha` is clamped to `[0, 1]`; NaN is treated as 0.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `image` or `mask` is
/// empty.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn overlay(image: &RgbImage, mask: &Mask, alpha: f32) -> Result<RgbImage, PipelineError> {
    let mask = fit_to(mask, image)?;
    let alpha = if alpha.is_nan() { 0.0 } else { alpha.clamp(0.0, 1.0) };
    let keep = 1.0 - alpha;

    let mut out = image.clone();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let color = label_color(mask.label(x, y));
        for (value, c) in pixel.0.iter_mut().zip(color) {
            let blended = f32::from(*value).mul_add(keep, f32::from(c) * alpha);
            *value = blended.round().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(out)
}

/// Keep only the diseased pixels of `image`; everything else turns
/// black.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `image` or `mask` is
/// empty.
pub fn extract_diseased(image: &RgbImage, mask: &Mask) -> Result<RgbImage, PipelineError> {
    let mask = fit_to(mask, image)?;
    let mut out = image.clone();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        if mask.label(x, y) != MaskLabel::Diseased {
            pixel.0 = [0, 0, 0];
        }
    }
    Ok(out)
}
