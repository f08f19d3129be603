//! Shared types for the leafscan pipeline.

use serde::{Deserialize, Serialize};

/// Re-export `GrayImage` so downstream crates can reference single-plane
/// raster data (masks, Lab planes) without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` so downstream crates can reference the decoded
/// photo and every preprocessing intermediate without depending on
/// `image` directly.
pub use image::RgbImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of an RGB image.
    #[must_use]
    pub fn of(image: &RgbImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    /// Total pixel count (`width * height`).
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Returns `true` if either axis is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Non-local-means parameters for the denoising stage.
///
/// The L plane is filtered with strength `h`; the a/b chrominance
/// planes are filtered jointly with strength `h_color`. Both window
/// sizes must be odd so the patch and search areas have a center pixel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenoiseParams {
    /// Filter strength for the luminance plane.
    pub h: f32,
    /// Filter strength for the chrominance planes.
    pub h_color: f32,
    /// Side length of the square patch compared between pixels.
    pub template_window: u32,
    /// Side length of the square area searched for similar patches.
    pub search_window: u32,
}

impl DenoiseParams {
    /// Default luminance filter strength.
    pub const DEFAULT_H: f32 = 10.0;
    /// Default chrominance filter strength.
    pub const DEFAULT_H_COLOR: f32 = 10.0;
    /// Default patch side length.
    pub const DEFAULT_TEMPLATE_WINDOW: u32 = 7;
    /// Default search area side length.
    pub const DEFAULT_SEARCH_WINDOW: u32 = 21;
    /// Largest accepted template or search window side length.
    pub const MAX_WINDOW: u32 = 255;
}

impl Default for DenoiseParams {
    fn default() -> Self {
        Self {
            h: Self::DEFAULT_H,
            h_color: Self::DEFAULT_H_COLOR,
            template_window: Self::DEFAULT_TEMPLATE_WINDOW,
            search_window: Self::DEFAULT_SEARCH_WINDOW,
        }
    }
}

/// Configuration for the preprocessing pipeline.
///
/// Every stage always runs; the configuration only tunes stage
/// parameters. Call [`validate`](Self::validate) before use when the
/// values come from an untrusted source (the pipeline entry points do
/// this themselves).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// CLAHE contrast limit, relative to a uniform histogram.
    pub clahe_clip_limit: f32,

    /// Number of CLAHE tiles along each axis.
    pub clahe_grid: u32,

    /// Non-local-means denoising parameters.
    pub denoise: DenoiseParams,

    /// Gaussian sigma of the blurred copy used by the unsharp mask.
    pub sharpen_sigma: f32,

    /// Weight of the original image in the unsharp mask. The blurred
    /// copy receives `1 - sharpen_amount`.
    pub sharpen_amount: f32,
}

impl PreprocessConfig {
    /// Default CLAHE clip limit.
    pub const DEFAULT_CLAHE_CLIP_LIMIT: f32 = 2.0;
    /// Default CLAHE tile grid size.
    pub const DEFAULT_CLAHE_GRID: u32 = 8;
    /// Largest accepted CLAHE tile grid size.
    pub const MAX_CLAHE_GRID: u32 = 64;
    /// Default unsharp-mask blur sigma.
    pub const DEFAULT_SHARPEN_SIGMA: f32 = 1.0;
    /// Default unsharp-mask weight of the original image.
    pub const DEFAULT_SHARPEN_AMOUNT: f32 = 1.5;

    /// Check parameter invariants.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first
    /// offending field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        fn positive(name: &str, value: f32) -> Result<(), PipelineError> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(PipelineError::InvalidConfig(format!(
                    "{name} must be a positive finite number, got {value}"
                )))
            }
        }
        fn odd_window(name: &str, value: u32) -> Result<(), PipelineError> {
            if value % 2 == 1 && value <= DenoiseParams::MAX_WINDOW {
                Ok(())
            } else {
                Err(PipelineError::InvalidConfig(format!(
                    "{name} must be odd and at most {}, got {value}",
                    DenoiseParams::MAX_WINDOW
                )))
            }
        }

        positive("clahe_clip_limit", self.clahe_clip_limit)?;
        if !(1..=Self::MAX_CLAHE_GRID).contains(&self.clahe_grid) {
            return Err(PipelineError::InvalidConfig(format!(
                "clahe_grid must be between 1 and {}, got {}",
                Self::MAX_CLAHE_GRID,
                self.clahe_grid
            )));
        }
        positive("denoise.h", self.denoise.h)?;
        positive("denoise.h_color", self.denoise.h_color)?;
        odd_window("denoise.template_window", self.denoise.template_window)?;
        odd_window("denoise.search_window", self.denoise.search_window)?;
        positive("sharpen_sigma", self.sharpen_sigma)?;
        if !self.sharpen_amount.is_finite() || self.sharpen_amount < 1.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "sharpen_amount must be at least 1.0, got {}",
                self.sharpen_amount
            )));
        }
        Ok(())
    }
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            clahe_clip_limit: Self::DEFAULT_CLAHE_CLIP_LIMIT,
            clahe_grid: Self::DEFAULT_CLAHE_GRID,
            denoise: DenoiseParams::default(),
            sharpen_sigma: Self::DEFAULT_SHARPEN_SIGMA,
            sharpen_amount: Self::DEFAULT_SHARPEN_AMOUNT,
        }
    }
}

/// Result of running the preprocessing pipeline with every intermediate
/// image preserved.
///
/// Each field is the output of one stage, in execution order.
#[derive(Debug, Clone)]
pub struct StagedResult {
    /// Stage 0: decoded RGB photo.
    pub original: RgbImage,
    /// Stage 1: gray-world white balance.
    pub balanced: RgbImage,
    /// Stage 2: CLAHE on Lab luminance.
    pub enhanced: RgbImage,
    /// Stage 3: non-local-means denoising.
    pub denoised: RgbImage,
    /// Stage 4: unsharp mask. This is the pipeline output.
    pub sharpened: RgbImage,
    /// Source image dimensions in pixels (shared by every stage).
    pub dimensions: Dimensions,
}

/// Coarse error class used by the service layer to pick the message
/// shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// The uploaded bytes are not a readable image.
    UnreadableImage,
    /// Preprocessing, inference, or configuration failed.
    Processing,
    /// The model produced a tensor the decoder cannot interpret.
    UnrecognizedModelOutput,
}

/// Errors that can occur anywhere in the leafscan pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// A preprocessing stage could not run on its input.
    #[error("preprocessing failed: {0}")]
    Preprocessing(String),

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// The inference tensor shape matches none of the decodable layouts.
    #[error("unsupported inference tensor shape {shape:?}")]
    UnsupportedTensorShape {
        /// The rejected shape.
        shape: Vec<usize>,
    },

    /// Tensor data does not agree with its declared shape.
    #[error("invalid inference tensor: {0}")]
    InvalidTensor(String),

    /// A mask pixel holds a value outside {0, 128, 255}.
    #[error("mask value {value} at ({x}, {y}) is not a valid label")]
    InvariantViolation {
        /// The offending value.
        value: u8,
        /// Column of the offending pixel.
        x: u32,
        /// Row of the offending pixel.
        y: u32,
    },

    /// The segmentation model reported a failure.
    #[error("model inference failed: {0}")]
    Inference(String),

    /// The caller-supplied time budget ran out.
    #[error("time budget exhausted during {stage}")]
    Timeout {
        /// Stage that was running or about to run.
        stage: &'static str,
    },
}

impl PipelineError {
    /// Classify this error for user-facing reporting.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::EmptyInput | Self::ImageDecode(_) => ErrorCategory::UnreadableImage,
            Self::UnsupportedTensorShape { .. } | Self::InvalidTensor(_) => {
                ErrorCategory::UnrecognizedModelOutput
            }
            Self::Preprocessing(_)
            | Self::InvalidConfig(_)
            | Self::InvariantViolation { .. }
            | Self::Inference(_)
            | Self::Timeout { .. } => ErrorCategory::Processing,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(PreprocessConfig::default().validate().is_ok());
    }

    #[test]
    fn default_config_matches_constants() {
        let config = PreprocessConfig::default();
        assert!((config.clahe_clip_limit - 2.0).abs() < f32::EPSILON);
        assert_eq!(config.clahe_grid, 8);
        assert_eq!(config.denoise.template_window, 7);
        assert_eq!(config.denoise.search_window, 21);
        assert!((config.denoise.h - 10.0).abs() < f32::EPSILON);
        assert!((config.denoise.h_color - 10.0).abs() < f32::EPSILON);
        assert!((config.sharpen_sigma - 1.0).abs() < f32::EPSILON);
        assert!((config.sharpen_amount - 1.5).abs() < f32::EPSILON);
    }

    #[test]
    fn even_search_window_rejected() {
        let config = PreprocessConfig {
            denoise: DenoiseParams {
                search_window: 20,
                ..DenoiseParams::default()
            },
            ..PreprocessConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(ref msg) if msg.contains("search_window")));
    }

    #[test]
    fn zero_grid_rejected() {
        let config = PreprocessConfig {
            clahe_grid: 0,
            ..PreprocessConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn oversized_grid_rejected() {
        let at_limit = PreprocessConfig {
            clahe_grid: PreprocessConfig::MAX_CLAHE_GRID,
            ..PreprocessConfig::default()
        };
        assert!(at_limit.validate().is_ok());

        let config = PreprocessConfig {
            clahe_grid: 100_000,
            ..PreprocessConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(msg)) if msg.contains("clahe_grid")
        ));
    }

    #[test]
    fn oversized_windows_rejected() {
        for (template_window, search_window) in [(257, 21), (7, u32::MAX)] {
            let config = PreprocessConfig {
                denoise: DenoiseParams {
                    template_window,
                    search_window,
                    ..DenoiseParams::default()
                },
                ..PreprocessConfig::default()
            };
            assert!(
                matches!(config.validate(), Err(PipelineError::InvalidConfig(_))),
                "template={template_window} search={search_window}"
            );
        }
    }

    #[test]
    fn nan_clip_limit_rejected() {
        let config = PreprocessConfig {
            clahe_clip_limit: f32::NAN,
            ..PreprocessConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_json_round_trip_with_partial_fields() {
        let config: PreprocessConfig =
            serde_json::from_str(r#"{"clahe_clip_limit": 3.0, "denoise": {"h": 5.0}}"#).unwrap();
        assert!((config.clahe_clip_limit - 3.0).abs() < f32::EPSILON);
        assert!((config.denoise.h - 5.0).abs() < f32::EPSILON);
        assert_eq!(config.denoise.search_window, 21);
        assert_eq!(config.clahe_grid, 8);
    }

    #[test]
    fn error_categories() {
        assert_eq!(
            PipelineError::EmptyInput.category(),
            ErrorCategory::UnreadableImage
        );
        assert_eq!(
            PipelineError::UnsupportedTensorShape { shape: vec![4] }.category(),
            ErrorCategory::UnrecognizedModelOutput
        );
        assert_eq!(
            PipelineError::Timeout { stage: "denoise" }.category(),
            ErrorCategory::Processing
        );
    }

    #[test]
    fn dimensions_pixel_count() {
        let dims = Dimensions {
            width: 70_000,
            height: 70_000,
        };
        assert_eq!(dims.pixel_count(), 4_900_000_000);
        assert!(!dims.is_empty());
        assert!(
            Dimensions {
                width: 0,
                height: 3
            }
            .is_empty()
        );
    }
}
