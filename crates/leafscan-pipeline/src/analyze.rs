//! End-to-end photo analysis: leaf check, preprocessing, inference,
//! mask decoding, and statistics.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::deadline::Deadline;
use crate::leaf::{DEFAULT_MIN_GREEN_PERCENT, green_percent, meets_threshold};
use crate::mask::{Mask, resize_nearest};
use crate::model::{ModelInput, SegmentationModel};
use crate::stats::{MaskStats, summarize};
use crate::types::{Dimensions, PipelineError, PreprocessConfig, RgbImage};

/// Configuration for [`Analyzer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Preprocessing parameters.
    pub preprocess: PreprocessConfig,

    /// Reject photos that do not look like a leaf before running the
    /// model.
    pub leaf_check: bool,

    /// Minimum green share, in percent, for the leaf check to pass.
    pub min_green_percent: f64,

    /// Wall-clock budget for one [`Analyzer::analyze`] call. `None`
    /// means unlimited.
    #[serde(with = "optional_secs")]
    pub timeout: Option<Duration>,
}

impl AnalyzerConfig {
    /// Default for [`leaf_check`](Self::leaf_check).
    pub const DEFAULT_LEAF_CHECK: bool = true;
    /// Default for [`min_green_percent`](Self::min_green_percent).
    pub const DEFAULT_MIN_GREEN_PERCENT: f64 = DEFAULT_MIN_GREEN_PERCENT;
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            preprocess: PreprocessConfig::default(),
            leaf_check: Self::DEFAULT_LEAF_CHECK,
            min_green_percent: Self::DEFAULT_MIN_GREEN_PERCENT,
            timeout: None,
        }
    }
}

/// Serde support for `Option<Duration>` as fractional seconds.
mod optional_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value.map(|d| d.as_secs_f64()).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| {
                Duration::try_from_secs_f64(secs).map_err(|_| {
                    serde::de::Error::custom("timeout must be a finite, non-negative number of seconds")
                })
            })
            .transpose()
    }
}

/// A segmented photo.
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// Three-class mask at the photo's original resolution.
    pub mask: Mask,
    /// Label statistics of [`mask`](Self::mask).
    pub stats: MaskStats,
    /// The preprocessed photo that was fed to the model (before
    /// resizing to the model input size).
    pub preprocessed: RgbImage,
}

/// Outcome of [`Analyzer::analyze`].
#[derive(Debug, Clone)]
pub enum Analysis {
    /// The leaf check rejected the photo; no inference was run.
    NotALeaf {
        /// Share of leaf-green pixels, in percent.
        green_percent: f64,
    },
    /// The photo was segmented.
    Segmented(Segmentation),
}

/// Runs the full analysis with one owned segmentation model.
///
/// The model is set up once by the caller and only read afterwards, so
/// an `Analyzer` can be shared between threads whenever `M` is `Sync`.
#[derive(Debug)]
pub struct Analyzer<M> {
    model: M,
    config: AnalyzerConfig,
}

impl<M: SegmentationModel> Analyzer<M> {
    /// Create an analyzer.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the preprocessing
    /// configuration is invalid, the green threshold is not finite, or
    /// the model's input size is zero.
    pub fn new(model: M, config: AnalyzerConfig) -> Result<Self, PipelineError> {
        config.preprocess.validate()?;
        if !config.min_green_percent.is_finite() {
            return Err(PipelineError::InvalidConfig(format!(
                "min_green_percent must be finite, got {}",
                config.min_green_percent
            )));
        }
        if model.input_size() == 0 {
            return Err(PipelineError::InvalidConfig(
                "model input size must be at least 1".to_owned(),
            ));
        }
        Ok(Self { model, config })
    }

    /// The analyzer configuration.
    #[must_use]
    pub const fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// The wrapped model.
    #[must_use]
    pub const fn model(&self) -> &M {
        &self.model
    }

    /// Analyze one encoded photo.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyInput`] or
    /// [`PipelineError::ImageDecode`] for unreadable bytes,
    /// [`PipelineError::Inference`] if the model fails,
    /// [`PipelineError::UnsupportedTensorShape`] or
    /// [`PipelineError::InvalidTensor`] for uninterpretable model output,
    /// and [`PipelineError::Timeout`] when the configured budget runs
    /// out. A timed-out call never returns a partial mask.
    pub fn analyze(&self, image_bytes: &[u8]) -> Result<Analysis, PipelineError> {
        let deadline = Deadline::from_budget(self.config.timeout);
        deadline.check("decode")?;
        let image = crate::decode::decode_rgb(image_bytes)?;
        self.analyze_image(&image, &deadline)
    }

    /// Analyze an already decoded photo.
    ///
    /// `deadline` replaces the configured
    /// [`timeout`](AnalyzerConfig::timeout); callers that want the
    /// configured budget pass `Deadline::from_budget(config.timeout)`.
    ///
    /// # Errors
    ///
    /// As [`analyze`](Self::analyze), minus the decoding errors, with
    /// [`PipelineError::Timeout`] raised against `deadline`.
    pub fn analyze_image(
        &self,
        image: &RgbImage,
        deadline: &Deadline,
    ) -> Result<Analysis, PipelineError> {
        crate::decode::ensure_non_empty(image)?;
        let dimensions = Dimensions::of(image);

        if self.config.leaf_check {
            let green = green_percent(image);
            if !meets_threshold(green, self.config.min_green_percent) {
                tracing::warn!(
                    green_percent = green,
                    threshold = self.config.min_green_percent,
                    "photo rejected: not a leaf"
                );
                return Ok(Analysis::NotALeaf {
                    green_percent: green,
                });
            }
            tracing::debug!(green_percent = green, "leaf check passed");
        }

        let preprocessed =
            crate::preprocess_with_deadline(image, &self.config.preprocess, deadline)?;

        deadline.check("inference")?;
        let input = ModelInput::from_image(&preprocessed, self.model.input_size())?;
        let tensor = self
            .model
            .infer(&input)
            .map_err(|e| PipelineError::Inference(e.to_string()))?;
        deadline.check("inference")?;

        let mask = crate::mask_decode::decode(&tensor)?;
        let mask = resize_nearest(&mask, dimensions.width, dimensions.height)?;
        let stats = summarize(&mask);

        tracing::info!(
            width = dimensions.width,
            height = dimensions.height,
            background = stats.background_percent,
            healthy = stats.healthy_percent,
            diseased = stats.diseased_percent,
            "segmentation complete"
        );

        Ok(Analysis::Segmented(Segmentation {
            mask,
            stats,
            preprocessed,
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::DenoiseParams;
    use crate::model::ModelError;
    use crate::tensor::InferenceTensor;

    /// Predicts a fixed class everywhere and counts its calls.
    struct Fixed {
        class: usize,
        size: u32,
        calls: Cell<usize>,
    }

    impl Fixed {
        fn new(class: usize) -> Self {
            Self {
                class,
                size: 8,
                calls: Cell::new(0),
            }
        }
    }

    impl SegmentationModel for Fixed {
        fn input_size(&self) -> u32 {
            self.size
        }

        fn infer(&self, input: &ModelInput) -> Result<InferenceTensor, ModelError> {
            self.calls.set(self.calls.get() + 1);
            let [h, w, _] = input.shape();
            let data = (0..h * w * 3)
                .map(|i| if i % 3 == self.class { 1.0 } else { 0.0 })
                .collect();
            Ok(InferenceTensor::new(vec![h, w, 3], data)?)
        }
    }

    struct Failing;

    impl SegmentationModel for Failing {
        fn infer(&self, _input: &ModelInput) -> Result<InferenceTensor, ModelError> {
            Err("session crashed".into())
        }
    }

    fn fast_config() -> AnalyzerConfig {
        AnalyzerConfig {
            preprocess: PreprocessConfig {
                denoise: DenoiseParams {
                    template_window: 3,
                    search_window: 3,
                    ..DenoiseParams::default()
                },
                ..PreprocessConfig::default()
            },
            ..AnalyzerConfig::default()
        }
    }

    fn green_photo() -> RgbImage {
        RgbImage::from_pixel(20, 14, image::Rgb([60, 150, 50]))
    }

    #[test]
    fn default_config_values() {
        let config = AnalyzerConfig::default();
        assert!(config.leaf_check);
        assert!((config.min_green_percent - 5.0).abs() < f64::EPSILON);
        assert_eq!(config.timeout, None);
    }

    #[test]
    fn config_timeout_json_as_seconds() {
        let config: AnalyzerConfig = serde_json::from_str(r#"{"timeout": 2.5}"#).unwrap();
        assert_eq!(config.timeout, Some(Duration::from_millis(2500)));
        let json = serde_json::to_value(&config).unwrap();
        assert!((json["timeout"].as_f64().unwrap() - 2.5).abs() < 1e-9);
        assert!(serde_json::from_str::<AnalyzerConfig>(r#"{"timeout": -1}"#).is_err());
    }

    #[test]
    fn healthy_prediction_at_original_resolution() {
        let analyzer = Analyzer::new(Fixed::new(1), fast_config()).unwrap();
        let analysis = analyzer
            .analyze_image(&green_photo(), &Deadline::none())
            .unwrap();
        let Analysis::Segmented(seg) = analysis else {
            panic!("expected a segmentation");
        };
        assert_eq!((seg.mask.width(), seg.mask.height()), (20, 14));
        assert!((seg.stats.healthy_percent - 100.0).abs() < 1e-9);
        assert_eq!(seg.preprocessed.dimensions(), (20, 14));
        assert_eq!(analyzer.model().calls.get(), 1);
    }

    #[test]
    fn gray_photo_is_rejected_without_inference() {
        let analyzer = Analyzer::new(Fixed::new(2), fast_config()).unwrap();
        let gray = RgbImage::from_pixel(10, 10, image::Rgb([120, 120, 120]));
        let analysis = analyzer.analyze_image(&gray, &Deadline::none()).unwrap();
        assert!(matches!(analysis, Analysis::NotALeaf { green_percent: g } if g < 1e-9));
        assert_eq!(analyzer.model().calls.get(), 0);
    }

    #[test]
    fn leaf_check_can_be_disabled() {
        let config = AnalyzerConfig {
            leaf_check: false,
            ..fast_config()
        };
        let analyzer = Analyzer::new(Fixed::new(2), config).unwrap();
        let gray = RgbImage::from_pixel(10, 10, image::Rgb([120, 120, 120]));
        let analysis = analyzer.analyze_image(&gray, &Deadline::none()).unwrap();
        let Analysis::Segmented(seg) = analysis else {
            panic!("expected a segmentation");
        };
        assert!((seg.stats.diseased_percent - 100.0).abs() < 1e-9);
    }

    #[test]
    fn model_failure_is_inference_error() {
        let analyzer = Analyzer::new(Failing, fast_config()).unwrap();
        let err = analyzer
            .analyze_image(&green_photo(), &Deadline::none())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Inference(ref msg) if msg.contains("session crashed")));
    }

    #[test]
    fn expired_deadline_returns_timeout() {
        let analyzer = Analyzer::new(Fixed::new(1), fast_config()).unwrap();
        let err = analyzer
            .analyze_image(&green_photo(), &Deadline::after(Duration::ZERO))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Timeout { .. }));
        assert_eq!(analyzer.model().calls.get(), 0);
    }

    #[test]
    fn caller_deadline_replaces_configured_timeout() {
        let config = AnalyzerConfig {
            timeout: Some(Duration::ZERO),
            ..fast_config()
        };
        let analyzer = Analyzer::new(Fixed::new(1), config).unwrap();
        let analysis = analyzer
            .analyze_image(&green_photo(), &Deadline::none())
            .unwrap();
        assert!(matches!(analysis, Analysis::Segmented(_)));
        assert_eq!(analyzer.model().calls.get(), 1);
    }

    #[test]
    fn zero_input_size_rejected() {
        let mut model = Fixed::new(0);
        model.size = 0;
        assert!(matches!(
            Analyzer::new(model, fast_config()),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn invalid_preprocess_config_rejected() {
        let mut config = fast_config();
        config.preprocess.sharpen_amount = 0.5;
        assert!(Analyzer::new(Fixed::new(0), config).is_err());
    }
}
