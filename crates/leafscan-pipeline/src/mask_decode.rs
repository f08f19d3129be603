//! Decode raw model output into a canonical [`Mask`].
//!
//! | Layout           | Rule                                              |
//! |------------------|---------------------------------------------------|
//! | `(h, w, c≥3)`    | argmax; class 0 → 0, 1 → 128, 2 and above → 255   |
//! | `(h, w, 2)`      | argmax; class 0 → 0, 1 → 255                      |
//! | `(h, w[, 1])`    | `v * 255` banded: `<85` → 0, `<170` → 128, else 255 |
//!
//! The two-channel layout has no healthy class and never yields 128.
//! Extra classes beyond the third are treated as diseased.

use crate::mask::{Mask, MaskLabel};
use crate::tensor::{InferenceTensor, TensorLayout};
use crate::types::PipelineError;

/// Lower bound (inclusive) of the healthy band for single-channel output.
pub const HEALTHY_THRESHOLD: u8 = 85;
/// Lower bound (inclusive) of the diseased band for single-channel output.
pub const DISEASED_THRESHOLD: u8 = 170;

/// Index of the largest value; ties go to the lowest index and NaN
/// never wins.
fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    let mut best_value = f32::NEG_INFINITY;
    for (i, &v) in values.iter().enumerate() {
        if v > best_value {
            best = i;
            best_value = v;
        }
    }
    best
}

const fn class_label(class: usize) -> MaskLabel {
    match class {
        0 => MaskLabel::Background,
        1 => MaskLabel::Healthy,
        _ => MaskLabel::Diseased,
    }
}

const fn binary_label(class: usize) -> MaskLabel {
    if class == 0 {
        MaskLabel::Background
    } else {
        MaskLabel::Diseased
    }
}

/// Scale a single-channel score onto `0..=255` the way an 8-bit cast
/// would: multiply by 255, clip, truncate. NaN maps to 0.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scaled_score(v: f32) -> u8 {
    if v.is_nan() {
        return 0;
    }
    (v * 255.0).clamp(0.0, 255.0) as u8
}

const fn band_label(scaled: u8) -> MaskLabel {
    if scaled < HEALTHY_THRESHOLD {
        MaskLabel::Background
    } else if scaled < DISEASED_THRESHOLD {
        MaskLabel::Healthy
    } else {
        MaskLabel::Diseased
    }
}

/// Decode a model output tensor into a mask at the model's resolution.
///
/// # Errors
///
/// Returns [`PipelineError::UnsupportedTensorShape`] if the shape
/// matches no layout, or if the spatial size does not fit in `u32`.
pub fn decode(tensor: &InferenceTensor) -> Result<Mask, PipelineError> {
    let layout = TensorLayout::classify(tensor.shape())?;
    let (height, width) = layout.spatial();
    let too_large = || PipelineError::UnsupportedTensorShape {
        shape: tensor.shape().to_vec(),
    };
    let w = u32::try_from(width).map_err(|_| too_large())?;
    let h = u32::try_from(height).map_err(|_| too_large())?;

    let data = tensor.data();
    let mask = match layout {
        TensorLayout::MultiClass { channels, .. } => Mask::from_fn(w, h, |x, y| {
            let start = (y as usize * width + x as usize) * channels;
            class_label(argmax(&data[start..start + channels]))
        }),
        TensorLayout::Binary { .. } => Mask::from_fn(w, h, |x, y| {
            let start = (y as usize * width + x as usize) * 2;
            binary_label(argmax(&data[start..start + 2]))
        }),
        TensorLayout::SingleChannel { .. } => Mask::from_fn(w, h, |x, y| {
            band_label(scaled_score(data[y as usize * width + x as usize]))
        }),
    };

    tracing::debug!(
        ?layout,
        width = w,
        height = h,
        "decoded model output"
    );

    // Labels are produced from `MaskLabel` directly; re-validating the
    // buffer keeps the post-condition explicit.
    Mask::from_gray(mask.into_gray())
}
