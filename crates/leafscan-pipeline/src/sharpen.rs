//! Unsharp-mask sharpening.
//!
//! A Gaussian-blurred copy of the image is computed first, then each
//! output value is `amount * original - (amount - 1) * blurred`, rounded
//! and clipped to `[0, 255]`. With the default `amount = 1.5` this is
//! `1.5 * original - 0.5 * blurred`: edges gain contrast, flat regions
//! stay put.

use image::GrayImage;

use crate::types::RgbImage;

/// Apply Gaussian blur to an RGB image by blurring each channel
/// independently.
///
/// Wraps [`imageproc::filter::gaussian_blur_f32`], which derives the
/// kernel size from `sigma` and only accepts `GrayImage`, so the image
/// is split into three planes, blurred, and reassembled.
///
/// Non-positive sigma values return the image unchanged, since
/// `imageproc` panics on `sigma <= 0.0`.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur_rgb(image: &RgbImage, sigma: f32) -> RgbImage {
    if sigma <= 0.0 {
        return image.clone();
    }

    let (w, h) = (image.width(), image.height());
    if w == 0 || h == 0 {
        return image.clone();
    }

    let channels: [GrayImage; 3] = std::array::from_fn(|c| {
        GrayImage::from_fn(w, h, |x, y| image::Luma([image.get_pixel(x, y).0[c]]))
    });

    let blurred: [GrayImage; 3] =
        std::array::from_fn(|c| imageproc::filter::gaussian_blur_f32(&channels[c], sigma));

    RgbImage::from_fn(w, h, |x, y| {
        image::Rgb([
            blurred[0].get_pixel(x, y).0[0],
            blurred[1].get_pixel(x, y).0[0],
            blurred[2].get_pixel(x, y).0[0],
        ])
    })
}

/// Sharpen an image with an unsharp mask.
///
/// `sigma` controls the blurred copy; `amount` is the weight of the
/// original image (the blurred copy gets `1 - amount`).
#[must_use = "returns the sharpened image"]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn unsharp_mask(image: &RgbImage, sigma: f32, amount: f32) -> RgbImage {
    let blurred = gaussian_blur_rgb(image, sigma);
    let blur_weight = 1.0 - amount;

    let mut out = image.clone();
    for (pixel, soft) in out.pixels_mut().zip(blurred.pixels()) {
        for (value, &b) in pixel.0.iter_mut().zip(soft.0.iter()) {
            let v = f32::from(*value).mul_add(amount, f32::from(b) * blur_weight);
            *value = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}
