//! Gray-world white balance.
//!
//! Assumes the average color of the scene is neutral gray: each channel
//! is scaled so its mean matches the mean over all channels. This
//! removes a global color cast (warm indoor light, green foliage
//! reflections) before the contrast and denoising stages.

use crate::types::RgbImage;

/// Per-channel gain computed by [`channel_gains`].
///
/// A gain of exactly `1.0` leaves the channel untouched.
pub type ChannelGains = [f64; 3];

/// Compute the gray-world gain for each channel.
///
/// The gain of a channel is `global_mean / channel_mean`. Both means
/// share the pixel count, so the ratio is computed from the exact
/// integer sums as `sum_all / (3 * sum_channel)`. A perfectly gray
/// image therefore yields gains of exactly `1.0`. A channel whose sum is
/// zero keeps a gain of `1.0` (nothing to scale).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn channel_gains(image: &RgbImage) -> ChannelGains {
    let mut sums = [0_u64; 3];
    for pixel in image.pixels() {
        for (sum, &value) in sums.iter_mut().zip(pixel.0.iter()) {
            *sum += u64::from(value);
        }
    }
    let total: u64 = sums.iter().sum();

    sums.map(|sum| {
        if sum == 0 {
            1.0
        } else {
            total as f64 / (3 * sum) as f64
        }
    })
}

/// Apply gray-world white balance.
///
/// Every value is multiplied by its channel gain, clipped to
/// `[0, 255]`, and truncated to an integer.
#[must_use = "returns the white-balanced image"]
pub fn gray_world(image: &RgbImage) -> RgbImage {
    let gains = channel_gains(image);
    apply_gains(image, gains)
}

/// Multiply each channel by the given gain, clip, and truncate.
#[must_use = "returns the scaled image"]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn apply_gains(image: &RgbImage, gains: ChannelGains) -> RgbImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        for (value, &gain) in pixel.0.iter_mut().zip(gains.iter()) {
            *value = (f64::from(*value) * gain).clamp(0.0, 255.0) as u8;
        }
    }
    out
}
