//! leafscan-pipeline: leaf photo preprocessing and segmentation mask
//! decoding (sans-IO).
//!
//! Prepares a photo for a semantic segmentation model through:
//! decode -> gray-world white balance -> CLAHE on Lab luminance ->
//! non-local-means denoising -> unsharp mask.
//!
//! The model itself is a caller-supplied [`SegmentationModel`]. Its raw
//! output is turned into a three-class [`Mask`] (background, healthy,
//! diseased) by [`mask_decode::decode`], summarized by
//! [`stats::summarize`], and rendered by [`visualize`]. [`Analyzer`]
//! wires all of it together.
//!
//! This crate has **no I/O dependencies**: it operates on in-memory
//! byte slices and images and never touches the filesystem. The bench
//! CLI in `leafscan-bench` handles files.

pub mod analyze;
pub mod clahe;
pub mod color;
pub mod deadline;
pub mod decode;
pub mod denoise;
pub mod diagnostics;
pub mod leaf;
pub mod mask;
pub mod mask_decode;
pub mod model;
pub mod pipeline;
pub mod sharpen;
pub mod stats;
pub mod tensor;
pub mod types;
pub mod visualize;
pub mod white_balance;

pub use analyze::{Analysis, Analyzer, AnalyzerConfig, Segmentation};
pub use deadline::Deadline;
pub use mask::{Mask, MaskLabel};
pub use model::{ModelError, ModelInput, SegmentationModel};
pub use pipeline::Pipeline;
pub use stats::MaskStats;
pub use tensor::{InferenceTensor, TensorLayout};
pub use types::{
    DenoiseParams, Dimensions, ErrorCategory, GrayImage, PipelineError, PreprocessConfig,
    RgbImage, StagedResult,
};

/// Run every preprocessing stage on a decoded photo.
///
/// # Pipeline steps
///
/// 1. Gray-world white balance
/// 2. CLAHE on the Lab L plane
/// 3. Non-local-means denoising in Lab
/// 4. Unsharp mask
///
/// The output has the same dimensions as the input.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] for a bad configuration and
/// [`PipelineError::Preprocessing`] for a zero-area image.
pub fn preprocess(image: &RgbImage, config: &PreprocessConfig) -> Result<RgbImage, PipelineError> {
    preprocess_with_deadline(image, config, &Deadline::none())
}

/// [`preprocess`] with a time budget.
///
/// The deadline is checked before every stage and once per denoiser
/// search offset.
///
/// # Errors
///
/// As [`preprocess`], plus [`PipelineError::Timeout`] when `deadline`
/// passes. No partial result is returned.
pub fn preprocess_with_deadline(
    image: &RgbImage,
    config: &PreprocessConfig,
    deadline: &Deadline,
) -> Result<RgbImage, PipelineError> {
    config.validate()?;
    decode::ensure_non_empty(image)?;
    tracing::debug!(
        width = image.width(),
        height = image.height(),
        "preprocessing photo"
    );

    // 1. White balance.
    deadline.check("white_balance")?;
    let balanced = white_balance::gray_world(image);

    // 2. Local contrast on luminance only.
    deadline.check("contrast")?;
    let enhanced = clahe::enhance_contrast(&balanced, config.clahe_grid, config.clahe_clip_limit);

    // 3. Edge-preserving denoise.
    deadline.check("denoise")?;
    let denoised = denoise::denoise(&enhanced, &config.denoise, deadline)?;

    // 4. Sharpen.
    deadline.check("sharpen")?;
    Ok(sharpen::unsharp_mask(
        &denoised,
        config.sharpen_sigma,
        config.sharpen_amount,
    ))
}

/// Decode photo bytes and preprocess them.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `image_bytes` is empty,
/// [`PipelineError::ImageDecode`] if the format is unrecognized, and
/// anything [`preprocess_with_deadline`] returns.
pub fn preprocess_bytes(
    image_bytes: &[u8],
    config: &PreprocessConfig,
    deadline: &Deadline,
) -> Result<RgbImage, PipelineError> {
    config.validate()?;
    deadline.check("decode")?;
    let image = decode::decode_rgb(image_bytes)?;
    preprocess_with_deadline(&image, config, deadline)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn fast_config() -> PreprocessConfig {
        PreprocessConfig {
            denoise: DenoiseParams {
                template_window: 3,
                search_window: 7,
                ..DenoiseParams::default()
            },
            ..PreprocessConfig::default()
        }
    }

    fn leaf_photo(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            if (x + y) % 7 < 4 {
                image::Rgb([70, 130, 60])
            } else {
                image::Rgb([150, 110, 80])
            }
        })
    }

    fn encode_png(img: &RgbImage) -> Vec<u8> {
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgb8,
        )
        .unwrap();
        buf
    }

    #[test]
    fn preprocess_preserves_dimensions() {
        for (w, h) in [(1, 1), (5, 3), (33, 17), (64, 64)] {
            let out = preprocess(&leaf_photo(w, h), &fast_config()).unwrap();
            assert_eq!(out.dimensions(), (w, h));
        }
    }

    #[test]
    fn preprocess_with_default_config() {
        let out = preprocess(&leaf_photo(24, 20), &PreprocessConfig::default()).unwrap();
        assert_eq!(out.dimensions(), (24, 20));
    }

    #[test]
    fn preprocess_is_deterministic() {
        let img = leaf_photo(20, 20);
        let a = preprocess(&img, &fast_config()).unwrap();
        let b = preprocess(&img, &fast_config()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn preprocess_rejects_empty_image() {
        assert!(matches!(
            preprocess(&RgbImage::new(0, 10), &fast_config()),
            Err(PipelineError::Preprocessing(_))
        ));
    }

    #[test]
    fn preprocess_rejects_invalid_config() {
        let config = PreprocessConfig {
            sharpen_sigma: -1.0,
            ..fast_config()
        };
        assert!(matches!(
            preprocess(&leaf_photo(8, 8), &config),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn preprocess_bytes_matches_preprocess() {
        let img = leaf_photo(18, 12);
        let from_bytes =
            preprocess_bytes(&encode_png(&img), &fast_config(), &Deadline::none()).unwrap();
        assert_eq!(from_bytes, preprocess(&img, &fast_config()).unwrap());
    }

    #[test]
    fn preprocess_bytes_empty_input() {
        assert!(matches!(
            preprocess_bytes(&[], &fast_config(), &Deadline::none()),
            Err(PipelineError::EmptyInput)
        ));
    }

    #[test]
    fn preprocess_bytes_corrupt_input() {
        assert!(matches!(
            preprocess_bytes(&[0xFF, 0x00, 0x12], &fast_config(), &Deadline::none()),
            Err(PipelineError::ImageDecode(_))
        ));
    }

    #[test]
    fn expired_deadline_yields_timeout() {
        let result = preprocess_with_deadline(
            &leaf_photo(16, 16),
            &fast_config(),
            &Deadline::after(Duration::ZERO),
        );
        assert!(matches!(
            result,
            Err(PipelineError::Timeout {
                stage: "white_balance"
            })
        ));
    }

    #[test]
    fn staged_pipeline_matches_one_shot() {
        let img = leaf_photo(20, 14);
        let staged = Pipeline::new(encode_png(&img), fast_config())
            .decode()
            .unwrap()
            .balance()
            .enhance()
            .denoise()
            .unwrap()
            .sharpen()
            .unwrap()
            .into_result();
        assert_eq!(staged.sharpened, preprocess(&img, &fast_config()).unwrap());
    }
}
