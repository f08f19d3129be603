//! Incremental preprocessing: advance stage by stage, inspecting each
//! intermediate image before continuing.
//!
//! Unlike [`crate::preprocess_bytes`], which runs every stage in one
//! call, [`Pipeline`] lets the caller drive execution one step at a
//! time:
//!
//! ```rust
//! # use leafscan_pipeline::{Pipeline, PreprocessConfig, PipelineError};
//! # fn run(photo: Vec<u8>) -> Result<(), PipelineError> {
//! let staged = Pipeline::new(photo, PreprocessConfig::default())
//!     .decode()?
//!     .balance()
//!     .enhance()
//!     .denoise()?
//!     .sharpen()?
//!     .into_result();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next state (or a
//! `Result` for fallible stages), carrying every earlier intermediate.
//!
//! # Deadlines
//!
//! A pipeline built with [`Pipeline::with_deadline`] checks its
//! [`Deadline`] before decoding, before and during denoising, and
//! before sharpening. White balance and contrast enhancement are
//! linear in the pixel count and run unchecked.
//!
//! # Memory
//!
//! Every stage retains all earlier RGB images. For a 12-megapixel photo
//! that is roughly 36 MB per stage, pinned until
//! [`Sharpened::into_result`] hands them over in a [`StagedResult`].
//! Callers that only need the final image should use
//! [`crate::preprocess`].

use crate::deadline::Deadline;
use crate::diagnostics::StageMetrics;
use crate::types::{Dimensions, PipelineError, PreprocessConfig, RgbImage, StagedResult};
use crate::white_balance::ChannelGains;

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
///
/// Call [`decode`](Self::decode) to advance.
#[must_use = "pipeline stages are consumed by advancing (call .decode() to continue)"]
pub struct Pending {
    config: PreprocessConfig,
    deadline: Deadline,
    source: Vec<u8>,
}

impl Pending {
    /// The raw source image bytes.
    #[must_use]
    pub fn source(&self) -> &[u8] {
        &self.source
    }

    /// Validate the configuration, decode the source image, and advance
    /// to the [`Decoded`] stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for a bad configuration,
    /// [`PipelineError::EmptyInput`] or [`PipelineError::ImageDecode`]
    /// when the bytes cannot be decoded, [`PipelineError::Preprocessing`]
    /// for a zero-area image, and [`PipelineError::Timeout`] if the
    /// deadline has already passed.
    pub fn decode(self) -> Result<Decoded, PipelineError> {
        self.config.validate()?;
        self.deadline.check("decode")?;
        let source_len = self.source.len();
        let original = crate::decode::decode_rgb(&self.source)?;
        crate::decode::ensure_non_empty(&original)?;
        let dimensions = Dimensions::of(&original);
        tracing::debug!(
            bytes = source_len,
            width = dimensions.width,
            height = dimensions.height,
            "decoded photo"
        );
        Ok(Decoded {
            config: self.config,
            deadline: self.deadline,
            original,
            source_len,
            dimensions,
        })
    }
}

// ───────────────────────── Stage 1: Decoded ──────────────────────────

/// Pipeline state after decoding the source image to RGB.
///
/// Call [`balance`](Self::balance) to advance.
#[must_use = "pipeline stages are consumed by advancing (call .balance() to continue)"]
pub struct Decoded {
    config: PreprocessConfig,
    deadline: Deadline,
    original: RgbImage,
    source_len: usize,
    dimensions: Dimensions,
}

impl Decoded {
    /// The decoded RGB photo.
    #[must_use]
    pub const fn original(&self) -> &RgbImage {
        &self.original
    }

    /// Photo dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Apply gray-world white balance and advance.
    pub fn balance(self) -> Balanced {
        let gains = crate::white_balance::channel_gains(&self.original);
        let balanced = crate::white_balance::apply_gains(&self.original, gains);
        tracing::debug!(?gains, "white balance");
        Balanced {
            config: self.config,
            deadline: self.deadline,
            original: self.original,
            balanced,
            gains,
            dimensions: self.dimensions,
        }
    }
}

// ───────────────────────── Stage 2: Balanced ─────────────────────────

/// Pipeline state after gray-world white balance.
///
/// Call [`enhance`](Self::enhance) to advance.
#[must_use = "pipeline stages are consumed by advancing (call .enhance() to continue)"]
pub struct Balanced {
    config: PreprocessConfig,
    deadline: Deadline,
    original: RgbImage,
    balanced: RgbImage,
    gains: ChannelGains,
    dimensions: Dimensions,
}

impl Balanced {
    /// The white-balanced image.
    #[must_use]
    pub const fn balanced(&self) -> &RgbImage {
        &self.balanced
    }

    /// Per-channel gains that were applied (R, G, B).
    #[must_use]
    pub const fn gains(&self) -> ChannelGains {
        self.gains
    }

    /// Equalize the Lab luminance with CLAHE and advance.
    pub fn enhance(self) -> Enhanced {
        let enhanced = crate::clahe::enhance_contrast(
            &self.balanced,
            self.config.clahe_grid,
            self.config.clahe_clip_limit,
        );
        tracing::debug!(
            grid = self.config.clahe_grid,
            clip_limit = self.config.clahe_clip_limit,
            "contrast enhancement"
        );
        Enhanced {
            config: self.config,
            deadline: self.deadline,
            original: self.original,
            balanced: self.balanced,
            enhanced,
            dimensions: self.dimensions,
        }
    }
}

// ───────────────────────── Stage 3: Enhanced ─────────────────────────

/// Pipeline state after CLAHE contrast enhancement.
///
/// Call [`denoise`](Self::denoise) to advance.
#[must_use = "pipeline stages are consumed by advancing (call .denoise() to continue)"]
pub struct Enhanced {
    config: PreprocessConfig,
    deadline: Deadline,
    original: RgbImage,
    balanced: RgbImage,
    enhanced: RgbImage,
    dimensions: Dimensions,
}

impl Enhanced {
    /// The contrast-enhanced image.
    #[must_use]
    pub const fn enhanced(&self) -> &RgbImage {
        &self.enhanced
    }

    /// Run non-local-means denoising and advance.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Timeout`] if the deadline passes before
    /// or during the filter.
    pub fn denoise(self) -> Result<Denoised, PipelineError> {
        self.deadline.check("denoise")?;
        let params = self.config.denoise;
        let denoised = crate::denoise::denoise(&self.enhanced, &params, &self.deadline)?;
        tracing::debug!(
            h = params.h,
            h_color = params.h_color,
            template_window = params.template_window,
            search_window = params.search_window,
            "denoise"
        );
        Ok(Denoised {
            config: self.config,
            deadline: self.deadline,
            original: self.original,
            balanced: self.balanced,
            enhanced: self.enhanced,
            denoised,
            dimensions: self.dimensions,
        })
    }
}

// ───────────────────────── Stage 4: Denoised ─────────────────────────

/// Pipeline state after non-local-means denoising.
///
/// Call [`sharpen`](Self::sharpen) to advance.
#[must_use = "pipeline stages are consumed by advancing (call .sharpen() to continue)"]
pub struct Denoised {
    config: PreprocessConfig,
    deadline: Deadline,
    original: RgbImage,
    balanced: RgbImage,
    enhanced: RgbImage,
    denoised: RgbImage,
    dimensions: Dimensions,
}

impl Denoised {
    /// The denoised image.
    #[must_use]
    pub const fn denoised(&self) -> &RgbImage {
        &self.denoised
    }

    /// Apply the unsharp mask and advance to the final stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Timeout`] if the deadline has passed.
    pub fn sharpen(self) -> Result<Sharpened, PipelineError> {
        self.deadline.check("sharpen")?;
        let sharpened = crate::sharpen::unsharp_mask(
            &self.denoised,
            self.config.sharpen_sigma,
            self.config.sharpen_amount,
        );
        tracing::debug!(
            sigma = self.config.sharpen_sigma,
            amount = self.config.sharpen_amount,
            "sharpen"
        );
        Ok(Sharpened {
            config: self.config,
            original: self.original,
            balanced: self.balanced,
            enhanced: self.enhanced,
            denoised: self.denoised,
            sharpened,
            dimensions: self.dimensions,
        })
    }
}

// ───────────────────────── Stage 5: Sharpened ────────────────────────

/// Final pipeline state: every preprocessing stage has run.
#[must_use = "call .into_result() to take the preprocessed images"]
pub struct Sharpened {
    config: PreprocessConfig,
    original: RgbImage,
    balanced: RgbImage,
    enhanced: RgbImage,
    denoised: RgbImage,
    sharpened: RgbImage,
    dimensions: Dimensions,
}

impl Sharpened {
    /// The sharpened image, which is the preprocessing output.
    #[must_use]
    pub const fn sharpened(&self) -> &RgbImage {
        &self.sharpened
    }

    /// Photo dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Consume the pipeline and return every intermediate image.
    #[must_use]
    pub fn into_result(self) -> StagedResult {
        StagedResult {
            original: self.original,
            balanced: self.balanced,
            enhanced: self.enhanced,
            denoised: self.denoised,
            sharpened: self.sharpened,
            dimensions: self.dimensions,
        }
    }
}

// ───────────────────────── Stage metadata ───────────────────────────

/// Implemented by every processed stage so diagnostics can time stage
/// transitions uniformly.
pub trait PipelineStage {
    /// Short stage name (e.g. `"decode"`, `"denoise"`).
    const NAME: &str;

    /// Metrics describing the work done to reach this state.
    fn metrics(&self) -> StageMetrics;
}

impl PipelineStage for Decoded {
    const NAME: &str = "decode";

    fn metrics(&self) -> StageMetrics {
        StageMetrics::Decode {
            input_bytes: self.source_len,
            width: self.dimensions.width,
            height: self.dimensions.height,
            pixel_count: self.dimensions.pixel_count(),
        }
    }
}

impl PipelineStage for Balanced {
    const NAME: &str = "white_balance";

    fn metrics(&self) -> StageMetrics {
        StageMetrics::WhiteBalance { gains: self.gains }
    }
}

impl PipelineStage for Enhanced {
    const NAME: &str = "contrast";

    fn metrics(&self) -> StageMetrics {
        StageMetrics::Contrast {
            clip_limit: self.config.clahe_clip_limit,
            grid: self.config.clahe_grid,
        }
    }
}

impl PipelineStage for Denoised {
    const NAME: &str = "denoise";

    fn metrics(&self) -> StageMetrics {
        let params = self.config.denoise;
        StageMetrics::Denoise {
            h: params.h,
            h_color: params.h_color,
            template_window: params.template_window,
            search_window: params.search_window,
        }
    }
}

impl PipelineStage for Sharpened {
    const NAME: &str = "sharpen";

    fn metrics(&self) -> StageMetrics {
        StageMetrics::Sharpen {
            sigma: self.config.sharpen_sigma,
            amount: self.config.sharpen_amount,
        }
    }
}

// ───────────────────── Pipeline entry point ──────────────────────────

/// Incremental preprocessing pipeline.
///
/// [`Pipeline::new`] stores the photo bytes and configuration without
/// doing any work. Each stage method consumes the current state and
/// returns the next, so skipping or reordering stages is a compile
/// error.
pub struct Pipeline;

impl Pipeline {
    /// Create a pipeline with no time budget.
    #[allow(clippy::new_ret_no_self)]
    pub const fn new(image_bytes: Vec<u8>, config: PreprocessConfig) -> Pending {
        Self::with_deadline(image_bytes, config, Deadline::none())
    }

    /// Create a pipeline that fails with [`PipelineError::Timeout`] once
    /// `deadline` passes.
    pub const fn with_deadline(
        image_bytes: Vec<u8>,
        config: PreprocessConfig,
        deadline: Deadline,
    ) -> Pending {
        Pending {
            config,
            deadline,
            source: image_bytes,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    /// PNG of a leaf-like photo: green blob on a brown background with
    /// a slight blue cast.
    fn leaf_png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_fn(width, height, |x, y| {
            let dx = f64::from(x) - f64::from(width) / 2.0;
            let dy = f64::from(y) - f64::from(height) / 2.0;
            if dx.hypot(dy) < f64::from(width.min(height)) / 3.0 {
                image::Rgb([60, 140, 70])
            } else {
                image::Rgb([120, 100, 90])
            }
        });
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

    /// Small windows keep the denoiser fast in tests.
    fn fast_config() -> PreprocessConfig {
        PreprocessConfig {
            denoise: crate::DenoiseParams {
                template_window: 3,
                search_window: 5,
                ..crate::DenoiseParams::default()
            },
            ..PreprocessConfig::default()
        }
    }

    #[test]
    fn pending_exposes_source_bytes() {
        let png = leaf_png(16, 16);
        let expected_len = png.len();
        let pending = Pipeline::new(png, fast_config());
        assert_eq!(pending.source().len(), expected_len);
    }

    #[test]
    fn decode_empty_input_returns_error() {
        let result = Pipeline::new(vec![], fast_config()).decode();
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn decode_corrupt_input_returns_error() {
        let result = Pipeline::new(vec![0xFF, 0x00], fast_config()).decode();
        assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
    }

    #[test]
    fn decode_rejects_invalid_config() {
        let config = PreprocessConfig {
            clahe_grid: 0,
            ..fast_config()
        };
        let result = Pipeline::new(leaf_png(16, 16), config).decode();
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn every_stage_preserves_dimensions() {
        let result = Pipeline::new(leaf_png(24, 18), fast_config())
            .decode()
            .unwrap()
            .balance()
            .enhance()
            .denoise()
            .unwrap()
            .sharpen()
            .unwrap()
            .into_result();
        assert_eq!(
            result.dimensions,
            Dimensions {
                width: 24,
                height: 18
            }
        );
        for img in [
            &result.original,
            &result.balanced,
            &result.enhanced,
            &result.denoised,
            &result.sharpened,
        ] {
            assert_eq!(img.dimensions(), (24, 18));
        }
    }

    #[test]
    fn balanced_reports_gains() {
        let balanced = Pipeline::new(leaf_png(16, 16), fast_config())
            .decode()
            .unwrap()
            .balance();
        let gains = balanced.gains();
        assert!(gains.iter().all(|g| g.is_finite() && *g > 0.0));
        // The photo is green-heavy, so green is scaled down.
        assert!(gains[1] < 1.0);
    }

    #[test]
    fn expired_deadline_stops_before_decode() {
        let pending =
            Pipeline::with_deadline(leaf_png(16, 16), fast_config(), Deadline::after(Duration::ZERO));
        assert!(matches!(
            pending.decode(),
            Err(PipelineError::Timeout { stage: "decode" })
        ));
    }

    #[test]
    fn stage_names_follow_execution_order() {
        assert_eq!(
            [
                Decoded::NAME,
                Balanced::NAME,
                Enhanced::NAME,
                Denoised::NAME,
                Sharpened::NAME,
            ],
            ["decode", "white_balance", "contrast", "denoise", "sharpen"]
        );
    }

    #[test]
    fn metrics_reflect_config() {
        let config = PreprocessConfig {
            clahe_grid: 4,
            sharpen_sigma: 0.8,
            ..fast_config()
        };
        let decoded = Pipeline::new(leaf_png(12, 10), config).decode().unwrap();
        assert_eq!(
            decoded.metrics(),
            StageMetrics::Decode {
                input_bytes: decoded.source_len,
                width: 12,
                height: 10,
                pixel_count: 120,
            }
        );
        let enhanced = decoded.balance().enhance();
        assert_eq!(
            enhanced.metrics(),
            StageMetrics::Contrast {
                clip_limit: PreprocessConfig::DEFAULT_CLAHE_CLIP_LIMIT,
                grid: 4,
            }
        );
        let sharpened = enhanced.denoise().unwrap().sharpen().unwrap();
        assert_eq!(
            sharpened.metrics(),
            StageMetrics::Sharpen {
                sigma: 0.8,
                amount: PreprocessConfig::DEFAULT_SHARPEN_AMOUNT,
            }
        );
    }
}
