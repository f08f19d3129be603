//! Raw segmentation model output.
//!
//! The model's output layout is not configured: the decoder inspects the
//! tensor shape and picks one of the [`TensorLayout`] interpretations.

use crate::types::PipelineError;

/// A dense row-major `f32` tensor as produced by a segmentation model,
/// without the batch dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceTensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl InferenceTensor {
    /// Wrap model output data.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidTensor`] if `data.len()` differs
    /// from the product of `shape` (or the product overflows).
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, PipelineError> {
        let expected = shape
            .iter()
            .try_fold(1_usize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| {
                PipelineError::InvalidTensor(format!("shape {shape:?} overflows usize"))
            })?;
        if expected != data.len() {
            return Err(PipelineError::InvalidTensor(format!(
                "shape {shape:?} needs {expected} values, got {}",
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// The tensor shape, outermost dimension first.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// The flat row-major values.
    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// How the decoder interprets a tensor, derived from its shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    /// `(h, w, c)` with `c >= 3`: per-class scores, one class per channel.
    MultiClass {
        /// Mask height.
        height: usize,
        /// Mask width.
        width: usize,
        /// Number of class channels.
        channels: usize,
    },
    /// `(h, w, 2)`: background / diseased scores.
    Binary {
        /// Mask height.
        height: usize,
        /// Mask width.
        width: usize,
    },
    /// `(h, w)` or `(h, w, 1)`: one value per pixel, thresholded into
    /// three bands.
    SingleChannel {
        /// Mask height.
        height: usize,
        /// Mask width.
        width: usize,
    },
}

impl TensorLayout {
    /// Classify a tensor shape.
    ///
    /// The cases are checked in priority order: multi-class, binary,
    /// single-channel.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnsupportedTensorShape`] for any other
    /// rank, for zero channels, and for a zero-sized spatial axis.
    pub fn classify(shape: &[usize]) -> Result<Self, PipelineError> {
        let unsupported = || PipelineError::UnsupportedTensorShape {
            shape: shape.to_vec(),
        };
        let layout = match *shape {
            [height, width, channels] if channels >= 3 => Self::MultiClass {
                height,
                width,
                channels,
            },
            [height, width, 2] => Self::Binary { height, width },
            [height, width] | [height, width, 1] => Self::SingleChannel { height, width },
            _ => return Err(unsupported()),
        };
        let (height, width) = layout.spatial();
        if height == 0 || width == 0 {
            return Err(unsupported());
        }
        Ok(layout)
    }

    /// `(height, width)` of the mask this layout decodes to.
    #[must_use]
    pub const fn spatial(self) -> (usize, usize) {
        match self {
            Self::MultiClass { height, width, .. }
            | Self::Binary { height, width }
            | Self::SingleChannel { height, width } => (height, width),
        }
    }
}
