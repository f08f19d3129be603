//! Color space conversions between 8-bit RGB, Lab, and HSV.
//!
//! Lab uses the common 8-bit encoding: sRGB primaries with a D65 white
//! point, `L` scaled from `0..=100` to `0..=255`, and `a`/`b` offset by
//! 128. HSV uses the 8-bit encoding with hue halved into `0..180` so it
//! fits in a byte.

use image::{GrayImage, Luma, Rgb};

use crate::types::RgbImage;

/// Threshold below which the Lab `f(t)` curve is linear.
const LAB_EPSILON: f32 = 0.008_856;
/// Slope of the linear segment of the Lab `f(t)` curve.
const LAB_KAPPA_SLOPE: f32 = 7.787;
/// `L` for luminance below [`LAB_EPSILON`] (`903.3 * Y`).
const LAB_KAPPA: f32 = 903.3;

/// D65 reference white, X and Z (Y is 1).
const WHITE_X: f32 = 0.950_456;
const WHITE_Z: f32 = 1.088_754;

/// An image split into L, a, b planes in the 8-bit Lab encoding.
///
/// Stored as three separate planes so stages that only touch luminance
/// can hand the chrominance planes through without copying them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabImage {
    /// Lightness, `0..=255` for `L* = 0..=100`.
    pub l: GrayImage,
    /// Green–red axis, offset by 128.
    pub a: GrayImage,
    /// Blue–yellow axis, offset by 128.
    pub b: GrayImage,
}

impl LabImage {
    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.l.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.l.height()
    }
}

fn srgb_to_linear(v: f32) -> f32 {
    if v <= 0.040_45 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(v: f32) -> f32 {
    if v <= 0.003_130_8 {
        12.92 * v
    } else {
        1.055f32.mul_add(v.powf(1.0 / 2.4), -0.055)
    }
}

fn lab_f(t: f32) -> f32 {
    if t > LAB_EPSILON {
        t.cbrt()
    } else {
        LAB_KAPPA_SLOPE.mul_add(t, 16.0 / 116.0)
    }
}

fn lab_f_inv(f: f32) -> f32 {
    let cube = f * f * f;
    if cube > LAB_EPSILON {
        cube
    } else {
        (f - 16.0 / 116.0) / LAB_KAPPA_SLOPE
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Convert a single RGB pixel to 8-bit Lab.
#[must_use]
pub fn rgb_to_lab_pixel(rgb: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = rgb.map(|c| srgb_to_linear(f32::from(c) / 255.0));

    let x = 0.180_423f32.mul_add(b, 0.412_453f32.mul_add(r, 0.357_580 * g)) / WHITE_X;
    let y = 0.072_169f32.mul_add(b, 0.212_671f32.mul_add(r, 0.715_160 * g));
    let z = 0.950_227f32.mul_add(b, 0.019_334f32.mul_add(r, 0.119_193 * g)) / WHITE_Z;

    let fx = lab_f(x);
    let fy = lab_f(y);
    let fz = lab_f(z);

    let l = if y > LAB_EPSILON {
        116.0f32.mul_add(fy, -16.0)
    } else {
        LAB_KAPPA * y
    };
    let a = 500.0f32.mul_add(fx - fy, 128.0);
    let bb = 200.0f32.mul_add(fy - fz, 128.0);

    [to_u8(l * 255.0 / 100.0), to_u8(a), to_u8(bb)]
}

/// Convert a single 8-bit Lab pixel back to RGB.
#[must_use]
pub fn lab_to_rgb_pixel(lab: [u8; 3]) -> [u8; 3] {
    let l = f32::from(lab[0]) * 100.0 / 255.0;
    let a = f32::from(lab[1]) - 128.0;
    let b = f32::from(lab[2]) - 128.0;

    let (y, fy) = if l <= LAB_KAPPA * LAB_EPSILON {
        let y = l / LAB_KAPPA;
        (y, lab_f(y))
    } else {
        let fy = (l + 16.0) / 116.0;
        (fy * fy * fy, fy)
    };
    let x = lab_f_inv(a / 500.0 + fy) * WHITE_X;
    let z = lab_f_inv(fy - b / 200.0) * WHITE_Z;

    let r = (-0.498_535f32).mul_add(z, 3.240_479f32.mul_add(x, -1.537_150 * y));
    let g = 0.041_556f32.mul_add(z, (-0.969_256f32).mul_add(x, 1.875_991 * y));
    let bl = 1.057_311f32.mul_add(z, 0.055_648f32.mul_add(x, -0.204_043 * y));

    [r, g, bl].map(|c| to_u8(linear_to_srgb(c.clamp(0.0, 1.0)) * 255.0))
}

/// Convert an RGB image to planar 8-bit Lab.
#[must_use = "returns the Lab planes"]
pub fn rgb_to_lab(image: &RgbImage) -> LabImage {
    let (w, h) = image.dimensions();
    let mut l = GrayImage::new(w, h);
    let mut a = GrayImage::new(w, h);
    let mut b = GrayImage::new(w, h);
    for (x, y, pixel) in image.enumerate_pixels() {
        let [lv, av, bv] = rgb_to_lab_pixel(pixel.0);
        l.put_pixel(x, y, Luma([lv]));
        a.put_pixel(x, y, Luma([av]));
        b.put_pixel(x, y, Luma([bv]));
    }
    LabImage { l, a, b }
}

/// Convert planar 8-bit Lab back to an RGB image.
#[must_use = "returns the RGB image"]
pub fn lab_to_rgb(lab: &LabImage) -> RgbImage {
    RgbImage::from_fn(lab.width(), lab.height(), |x, y| {
        Rgb(lab_to_rgb_pixel([
            lab.l.get_pixel(x, y).0[0],
            lab.a.get_pixel(x, y).0[0],
            lab.b.get_pixel(x, y).0[0],
        ]))
    })
}

/// Convert a single RGB pixel to 8-bit HSV (`H` in `0..180`).
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn rgb_to_hsv_pixel(rgb: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = rgb.map(f32::from);
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = v - min;

    let s = if v > 0.0 { 255.0 * diff / v } else { 0.0 };

    let mut hue = if diff == 0.0 {
        0.0
    } else if (v - r).abs() < f32::EPSILON {
        60.0 * (g - b) / diff
    } else if (v - g).abs() < f32::EPSILON {
        60.0f32.mul_add((b - r) / diff, 120.0)
    } else {
        60.0f32.mul_add((r - g) / diff, 240.0)
    };
    if hue < 0.0 {
        hue += 360.0;
    }

    // 360 degrees halved; a hue that rounds up to 180 wraps to 0.
    let h = (hue / 2.0).round() as u32 % 180;
    [h as u8, to_u8(s), to_u8(v)]
}
