//! The canonical three-class segmentation mask.
//!
//! A [`Mask`] is a single-plane 8-bit image whose every pixel is one of
//! three label values: 0 (background), 128 (healthy leaf), or 255
//! (diseased tissue). The invariant is established by the constructors
//! and cannot be broken afterwards because the pixel buffer is never
//! handed out mutably.
//!
//! [`resize_nearest`] is the only resampling allowed on masks: it copies
//! source labels and never blends two of them into a new value.

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, GrayImage, PipelineError};

/// One pixel class of a [`Mask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MaskLabel {
    /// Not part of the leaf.
    Background = 0,
    /// Healthy leaf tissue.
    Healthy = 128,
    /// Diseased tissue.
    Diseased = 255,
}

impl MaskLabel {
    /// The 8-bit value stored in the mask for this label.
    #[must_use]
    pub const fn value(self) -> u8 {
        self as u8
    }

    /// The label stored as `value`, if it is one.
    #[must_use]
    pub const fn from_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Background),
            128 => Some(Self::Healthy),
            255 => Some(Self::Diseased),
            _ => None,
        }
    }
}

/// A segmentation mask whose pixels are all valid [`MaskLabel`] values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask(GrayImage);

impl Mask {
    /// Build a mask by evaluating `f` at every pixel.
    #[must_use]
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> MaskLabel) -> Self {
        Self(GrayImage::from_fn(width, height, |x, y| {
            image::Luma([f(x, y).value()])
        }))
    }

    /// A mask with every pixel set to `label`.
    #[must_use]
    pub fn filled(width: u32, height: u32, label: MaskLabel) -> Self {
        Self(GrayImage::from_pixel(width, height, image::Luma([label.value()])))
    }

    /// Wrap a grayscale image, checking every pixel.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvariantViolation`] for the first pixel
    /// (in row-major order) holding a value outside {0, 128, 255}.
    pub fn from_gray(image: GrayImage) -> Result<Self, PipelineError> {
        if let Some((x, y, p)) = image
            .enumerate_pixels()
            .find(|(_, _, p)| MaskLabel::from_value(p.0[0]).is_none())
        {
            return Err(PipelineError::InvariantViolation {
                value: p.0[0],
                x,
                y,
            });
        }
        Ok(Self(image))
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.0.height()
    }

    /// Mask dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width(),
            height: self.height(),
        }
    }

    /// Label at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are out of bounds, like
    /// [`GrayImage::get_pixel`].
    #[must_use]
    pub fn label(&self, x: u32, y: u32) -> MaskLabel {
        match self.0.get_pixel(x, y).0[0] {
            0 => MaskLabel::Background,
            128 => MaskLabel::Healthy,
            _ => MaskLabel::Diseased,
        }
    }

    /// Iterate over all labels in row-major order.
    pub fn labels(&self) -> impl Iterator<Item = MaskLabel> + '_ {
        self.0.as_raw().iter().map(|&v| match v {
            0 => MaskLabel::Background,
            128 => MaskLabel::Healthy,
            _ => MaskLabel::Diseased,
        })
    }

    /// Borrow the underlying grayscale image (for encoding or display).
    #[must_use]
    pub const fn as_gray(&self) -> &GrayImage {
        &self.0
    }

    /// Consume the mask, returning the underlying grayscale image.
    #[must_use]
    pub fn into_gray(self) -> GrayImage {
        self.0
    }
}

/// Resize a mask with nearest-neighbor sampling.
///
/// Output pixel `(x, y)` copies source pixel
/// `(floor(x * src_w / width), floor(y * src_h / height))`, computed in
/// integer arithmetic. Scaling up by an integer factor and back down
/// therefore reproduces the original mask exactly.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if the target or source has
/// zero area.
#[allow(clippy::cast_possible_truncation)]
pub fn resize_nearest(mask: &Mask, width: u32, height: u32) -> Result<Mask, PipelineError> {
    if width == 0 || height == 0 {
        return Err(PipelineError::InvalidConfig(format!(
            "mask resize target must be non-empty, got {width}x{height}"
        )));
    }
    let (src_w, src_h) = (mask.width(), mask.height());
    if src_w == 0 || src_h == 0 {
        return Err(PipelineError::InvalidConfig(
            "cannot resize an empty mask".to_owned(),
        ));
    }
    if (src_w, src_h) == (width, height) {
        return Ok(mask.clone());
    }

    // Result always < src dimension, which fits in u32.
    let map = |dst: u32, dst_len: u32, src_len: u32| -> u32 {
        (u64::from(dst) * u64::from(src_len) / u64::from(dst_len)) as u32
    };
    let columns: Vec<u32> = (0..width).map(|x| map(x, width, src_w)).collect();

    let src = mask.as_gray();
    Ok(Mask(GrayImage::from_fn(width, height, |x, y| {
        let sy = map(y, height, src_h);
        *src.get_pixel(columns[x as usize], sy)
    })))
}
