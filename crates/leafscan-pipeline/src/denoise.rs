//! Non-local-means denoising.
//!
//! Each output pixel is a weighted average of the pixels in a square
//! search window around it. The weight of a candidate is
//! `exp(-d / h²)`, where `d` is the mean squared difference between the
//! square patch around the candidate and the patch around the pixel
//! being denoised. Flat regions average over many similar patches and
//! lose their noise; across an edge the patches differ strongly, the
//! weights vanish, and the edge stays sharp.
//!
//! The photo is filtered in Lab: the L plane alone with strength `h`,
//! and the a/b planes jointly with strength `h_color`.
//!
//! For speed the loops run per search offset rather than per pixel: for
//! one offset the squared difference between the image and its shifted
//! copy is summed into a summed-area table, and every pixel's patch
//! distance is read from it in constant time. The result is exact box
//! patch distances at a cost independent of the patch size.

use image::{GrayImage, Luma};

use crate::clahe::reflect101;
use crate::color::{self, LabImage};
use crate::deadline::Deadline;
use crate::types::{DenoiseParams, PipelineError, RgbImage};

/// Denoise an RGB image with non-local means in Lab space.
///
/// # Errors
///
/// Returns [`PipelineError::Timeout`] if `deadline` passes while the
/// filter is running.
pub fn denoise(
    image: &RgbImage,
    params: &DenoiseParams,
    deadline: &Deadline,
) -> Result<RgbImage, PipelineError> {
    let lab = color::rgb_to_lab(image);
    let windows = (params.template_window, params.search_window);

    let mut l = nl_means(&[&lab.l], params.h, windows, deadline)?;
    let mut ab = nl_means(&[&lab.a, &lab.b], params.h_color, windows, deadline)?;

    let (Some(l), Some(b), Some(a)) = (l.pop(), ab.pop(), ab.pop()) else {
        return Err(PipelineError::Preprocessing(
            "denoiser returned the wrong number of planes".to_owned(),
        ));
    };
    Ok(color::lab_to_rgb(&LabImage { l, a, b }))
}

/// A plane copied into `f32` with a reflect-101 border of `pad` pixels.
struct PaddedPlane {
    data: Vec<f32>,
}

impl PaddedPlane {
    #[allow(clippy::cast_possible_wrap)]
    fn new(plane: &GrayImage, pad: usize) -> Self {
        let (w, h) = (plane.width() as usize, plane.height() as usize);
        let (pw, ph) = (w + 2 * pad, h + 2 * pad);
        let src = plane.as_raw();
        let mut data = Vec::with_capacity(pw * ph);
        for py in 0..ph {
            let sy = reflect101(py as isize - pad as isize, h);
            for px in 0..pw {
                let sx = reflect101(px as isize - pad as isize, w);
                data.push(f32::from(src[sy * w + sx]));
            }
        }
        Self { data }
    }
}

/// Jointly filter one or more same-sized planes with non-local means.
///
/// Patch distances are averaged over all planes, so the planes share
/// one set of weights. `windows` is `(template, search)`; both are side
/// lengths and should be odd (an even value behaves like the next odd
/// value below it).
///
/// # Errors
///
/// Returns [`PipelineError::Timeout`] if `deadline` passes. The
/// deadline is checked once per search offset.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap,
    clippy::too_many_lines
)]
pub fn nl_means(
    planes: &[&GrayImage],
    h: f32,
    windows: (u32, u32),
    deadline: &Deadline,
) -> Result<Vec<GrayImage>, PipelineError> {
    let Some(first) = planes.first() else {
        return Ok(Vec::new());
    };
    let (width, height) = first.dimensions();
    if planes.iter().any(|p| p.dimensions() != (width, height)) {
        return Err(PipelineError::Preprocessing(
            "denoiser planes differ in size".to_owned(),
        ));
    }
    let (w, ht) = (width as usize, height as usize);
    if w == 0 || ht == 0 {
        return Ok(planes.iter().map(|p| (*p).clone()).collect());
    }

    let tr = (windows.0 / 2) as usize;
    let sr = (windows.1 / 2) as usize;
    let t = 2 * tr + 1;
    let pad = tr + sr;
    let pw = w + 2 * pad;

    let padded: Vec<PaddedPlane> = planes.iter().map(|p| PaddedPlane::new(p, pad)).collect();

    // Region of patch pixels: every pixel within `tr` of the image.
    let (rw, rh) = (w + 2 * tr, ht + 2 * tr);
    let stride = rw + 1;
    let mut integral = vec![0.0_f64; stride * (rh + 1)];

    let norm = 1.0 / (t * t * planes.len()) as f64;
    let inv_h2 = 1.0 / (f64::from(h) * f64::from(h));

    let mut acc = vec![vec![0.0_f64; w * ht]; planes.len()];
    let mut weight_sum = vec![0.0_f64; w * ht];

    let sr_i = sr as isize;
    for dy in -sr_i..=sr_i {
        for dx in -sr_i..=sr_i {
            deadline.check("denoise")?;
            let shift = dy * pw as isize + dx;

            // Summed-area table of the squared difference between the
            // image and its copy shifted by (dx, dy).
            for ry in 0..rh {
                let mut row_sum = 0.0_f64;
                let base = (ry + sr) * pw + sr;
                for rx in 0..rw {
                    let p = base + rx;
                    let q = (p as isize + shift) as usize;
                    let mut d = 0.0_f32;
                    for plane in &padded {
                        let diff = plane.data[p] - plane.data[q];
                        d = diff.mul_add(diff, d);
                    }
                    row_sum += f64::from(d);
                    integral[(ry + 1) * stride + rx + 1] = integral[ry * stride + rx + 1] + row_sum;
                }
            }

            for y in 0..ht {
                for x in 0..w {
                    let box_sum = integral[(y + t) * stride + x + t] - integral[y * stride + x + t]
                        - integral[(y + t) * stride + x]
                        + integral[y * stride + x];
                    let distance = (box_sum * norm).max(0.0);
                    let weight = (-distance * inv_h2).exp();

                    let i = y * w + x;
                    let q = ((y + pad) * pw + x + pad) as isize + shift;
                    let q = q as usize;
                    for (plane, sum) in padded.iter().zip(acc.iter_mut()) {
                        sum[i] += weight * f64::from(plane.data[q]);
                    }
                    weight_sum[i] += weight;
                }
            }
        }
    }

    Ok(acc
        .iter()
        .map(|sum| {
            GrayImage::from_fn(width, height, |x, y| {
                let i = y as usize * w + x as usize;
                // The zero offset always contributes weight 1.
                let value = sum[i] / weight_sum[i];
                Luma([value.round().clamp(0.0, 255.0) as u8])
            })
        })
        .collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
mod tests {
    use std::time::Duration;

    use super::*;

    /// Deterministic pseudo-noise in `-8..=8`.
    fn noise(x: u32, y: u32) -> i32 {
        i32::try_from((x * 37 + y * 91 + x * y * 13) % 17).unwrap_or(0) - 8
    }

    fn noisy_flat(w: u32, h: u32, level: i32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| Luma([(level + noise(x, y)).clamp(0, 255) as u8]))
    }

    fn variance(img: &GrayImage) -> f64 {
        let n = f64::from(img.width() * img.height());
        let mean = img.pixels().map(|p| f64::from(p.0[0])).sum::<f64>() / n;
        img.pixels()
            .map(|p| (f64::from(p.0[0]) - mean).powi(2))
            .sum::<f64>()
            / n
    }

    #[test]
    fn flat_noise_is_reduced() {
        let img = noisy_flat(32, 32, 128);
        let out = nl_means(&[&img], 10.0, (7, 21), &Deadline::none()).unwrap();
        let before = variance(&img);
        let after = variance(&out[0]);
        assert!(
            after < before / 2.0,
            "expected variance to drop by half, before={before:.2} after={after:.2}",
        );
    }

    #[test]
    fn constant_plane_unchanged() {
        let img = GrayImage::from_pixel(12, 9, Luma([77]));
        let out = nl_means(&[&img], 10.0, (7, 21), &Deadline::none()).unwrap();
        assert_eq!(out[0], img);
    }

    #[test]
    fn step_edge_is_preserved() {
        let img = GrayImage::from_fn(32, 32, |x, y| {
            let base = if x < 16 { 40 } else { 210 };
            Luma([(base + noise(x, y)) as u8])
        });
        let out = nl_means(&[&img], 10.0, (7, 21), &Deadline::none()).unwrap();
        for y in 0..32 {
            let left = out[0].get_pixel(15, y).0[0];
            let right = out[0].get_pixel(16, y).0[0];
            assert!(left < 60, "row {y}: left of edge blurred to {left}");
            assert!(right > 190, "row {y}: right of edge blurred to {right}");
        }
    }

    #[test]
    fn joint_planes_keep_count_and_size() {
        let a = noisy_flat(10, 6, 100);
        let b = noisy_flat(10, 6, 150);
        let out = nl_means(&[&a, &b], 10.0, (7, 21), &Deadline::none()).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].dimensions(), (10, 6));
        assert_eq!(out[1].dimensions(), (10, 6));
    }

    #[test]
    fn tiny_image_is_handled() {
        let img = GrayImage::from_pixel(1, 1, Luma([5]));
        let out = nl_means(&[&img], 10.0, (7, 21), &Deadline::none()).unwrap();
        assert_eq!(out[0].get_pixel(0, 0).0[0], 5);
    }

    #[test]
    fn mismatched_planes_rejected() {
        let a = GrayImage::new(4, 4);
        let b = GrayImage::new(4, 5);
        assert!(matches!(
            nl_means(&[&a, &b], 10.0, (7, 21), &Deadline::none()),
            Err(PipelineError::Preprocessing(_))
        ));
    }

    #[test]
    fn expired_deadline_aborts() {
        let img = noisy_flat(8, 8, 128);
        let deadline = Deadline::after(Duration::ZERO);
        let result = denoise(
            &RgbImage::from_fn(8, 8, |x, y| {
                let v = img.get_pixel(x, y).0[0];
                image::Rgb([v, v, v])
            }),
            &DenoiseParams::default(),
            &deadline,
        );
        assert!(matches!(result, Err(PipelineError::Timeout { stage: "denoise" })));
    }

    #[test]
    fn rgb_denoise_preserves_dimensions() {
        let img = RgbImage::from_fn(14, 9, |x, y| {
            let n = noise(x, y);
            image::Rgb([
                (60 + n).clamp(0, 255) as u8,
                (150 + n).clamp(0, 255) as u8,
                (70 - n).clamp(0, 255) as u8,
            ])
        });
        let out = denoise(&img, &DenoiseParams::default(), &Deadline::none()).unwrap();
        assert_eq!(out.dimensions(), (14, 9));
    }
}
