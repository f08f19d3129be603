//! Image decoding.
//!
//! Accepts raw image bytes (PNG, JPEG, BMP, WebP) and produces an 8-bit
//! RGB image. Alpha is dropped and grayscale or 16-bit sources are
//! converted, so every later stage sees the same pixel layout.

use crate::types::{PipelineError, RgbImage};

/// Decode raw image bytes into an RGB image.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
#[must_use = "returns the decoded image"]
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?;
    Ok(img.to_rgb8())
}

/// Reject images with zero area.
///
/// # Errors
///
/// Returns [`PipelineError::Preprocessing`] if either axis is zero.
pub fn ensure_non_empty(image: &RgbImage) -> Result<(), PipelineError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(PipelineError::Preprocessing(format!(
            "image has zero area ({}x{})",
            image.width(),
            image.height()
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn encode_png(img: &image::RgbaImage) -> Vec<u8> {
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .unwrap();
        buf
    }

    #[test]
    fn empty_input_returns_error() {
        let result = decode_rgb(&[]);
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn corrupt_bytes_returns_image_decode_error() {
        let result = decode_rgb(&[0xFF, 0xFE, 0x00, 0x01]);
        assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
    }

    #[test]
    fn rgba_png_decodes_to_rgb_dropping_alpha() {
        let img = image::RgbaImage::from_fn(3, 2, |_, _| image::Rgba([10, 200, 30, 7]));
        let rgb = decode_rgb(&encode_png(&img)).unwrap();
        assert_eq!(rgb.dimensions(), (3, 2));
        for p in rgb.pixels() {
            assert_eq!(p.0, [10, 200, 30]);
        }
    }

    #[test]
    fn output_dimensions_match_input() {
        let img = image::RgbaImage::from_fn(17, 31, |_, _| image::Rgba([128, 64, 32, 255]));
        let rgb = decode_rgb(&encode_png(&img)).unwrap();
        assert_eq!(rgb.width(), 17);
        assert_eq!(rgb.height(), 31);
    }

    #[test]
    fn zero_area_rejected() {
        let img = RgbImage::new(0, 5);
        assert!(matches!(
            ensure_non_empty(&img),
            Err(PipelineError::Preprocessing(_))
        ));
        assert!(ensure_non_empty(&RgbImage::new(1, 1)).is_ok());
    }
}
