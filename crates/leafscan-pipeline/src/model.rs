//! The segmentation model seam.
//!
//! The pipeline does not run a neural network itself. Callers plug in
//! an implementation of [`SegmentationModel`] (an ONNX or TFLite
//! session, a remote service, a test double) and the [`Analyzer`]
//! feeds it a [`ModelInput`] built from the preprocessed photo.
//!
//! [`Analyzer`]: crate::analyze::Analyzer

use image::imageops::FilterType;

use crate::tensor::InferenceTensor;
use crate::types::{PipelineError, RgbImage};

/// Error type returned by model implementations.
pub type ModelError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Default square input side length expected by segmentation models.
pub const DEFAULT_INPUT_SIZE: u32 = 256;

/// Model input: a `size x size x 3` RGB tensor in HWC order with values
/// scaled to `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInput {
    size: u32,
    data: Vec<f32>,
}

impl ModelInput {
    /// Resize `image` to `size x size` with a triangle (bilinear) filter
    /// and convert it to normalized floats.
    ///
    /// The aspect ratio is not preserved; the model sees the whole photo
    /// stretched to a square.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `size` is zero, or
    /// [`PipelineError::Preprocessing`] if `image` is empty.
    pub fn from_image(image: &RgbImage, size: u32) -> Result<Self, PipelineError> {
        if size == 0 {
            return Err(PipelineError::InvalidConfig(
                "model input size must be at least 1".to_owned(),
            ));
        }
        crate::decode::ensure_non_empty(image)?;

        let resized = if image.dimensions() == (size, size) {
            image.clone()
        } else {
            image::imageops::resize(image, size, size, FilterType::Triangle)
        };
        let data = resized
            .as_raw()
            .iter()
            .map(|&v| f32::from(v) / 255.0)
            .collect();
        Ok(Self { size, data })
    }

    /// Side length of the square input.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Tensor shape: `[size, size, 3]`.
    #[must_use]
    pub fn shape(&self) -> [usize; 3] {
        let s = self.size as usize;
        [s, s, 3]
    }

    /// Flat HWC values.
    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// A semantic segmentation model.
///
/// Implementations receive the input without a batch dimension and
/// return the output without one; adding and stripping the batch axis
/// is the adapter's job.
pub trait SegmentationModel {
    /// Side length of the square input the model expects.
    fn input_size(&self) -> u32 {
        DEFAULT_INPUT_SIZE
    }

    /// Run inference on one input.
    ///
    /// # Errors
    ///
    /// Returns whatever error the underlying runtime reports.
    fn infer(&self, input: &ModelInput) -> Result<InferenceTensor, ModelError>;
}

impl<M: SegmentationModel + ?Sized> SegmentationModel for &M {
    fn input_size(&self) -> u32 {
        (**self).input_size()
    }

    fn infer(&self, input: &ModelInput) -> Result<InferenceTensor, ModelError> {
        (**self).infer(input)
    }
}

impl<M: SegmentationModel + ?Sized> SegmentationModel for Box<M> {
    fn input_size(&self) -> u32 {
        (**self).input_size()
    }

    fn infer(&self, input: &ModelInput) -> Result<InferenceTensor, ModelError> {
        (**self).infer(input)
    }
}
