//! Contrast-limited adaptive histogram equalization (CLAHE).
//!
//! The photo is converted to Lab and only the L plane is equalized, so
//! local contrast improves without shifting hue: the a/b planes are
//! carried through byte-for-byte.
//!
//! The L plane is divided into a `grid × grid` set of tiles. Each tile
//! gets its own lookup table built from a clipped histogram (bins above
//! the limit are cut and the excess is spread over all bins), and every
//! output pixel is bilinearly interpolated between the lookup tables of
//! the four nearest tile centers so tile seams do not show.
//!
//! When the plane size is not a multiple of the grid, tiles are sized
//! for a plane extended by reflect-101 and histograms sample the
//! reflected pixels. The output keeps the original size.

use image::GrayImage;

use crate::color::{self, LabImage};
use crate::types::RgbImage;

const HIST_SIZE: usize = 256;

type Lut = [u8; HIST_SIZE];

/// Map an out-of-range coordinate back into `0..len` by reflect-101
/// (`dcb|abcd|cba`, edge pixel not repeated).
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
pub(crate) fn reflect101(i: isize, len: usize) -> usize {
    if len <= 1 {
        return 0;
    }
    let period = 2 * (len as isize - 1);
    let r = i.rem_euclid(period);
    if r >= len as isize {
        (period - r) as usize
    } else {
        r as usize
    }
}

/// Equalize a single 8-bit plane with CLAHE.
///
/// `grid` is the number of tiles along each axis (clamped to at least
/// 1). `clip_limit` is relative to a uniform histogram: a tile's
/// per-bin cap is `clip_limit * tile_area / 256`, at least one pixel.
#[must_use = "returns the equalized plane"]
pub fn equalize_plane(plane: &GrayImage, grid: u32, clip_limit: f32) -> GrayImage {
    let (w, h) = (plane.width() as usize, plane.height() as usize);
    if w == 0 || h == 0 {
        return plane.clone();
    }
    let grid = grid.max(1) as usize;

    let tile_w = w.div_ceil(grid);
    let tile_h = h.div_ceil(grid);

    let src = plane.as_raw();
    let luts: Vec<Lut> = (0..grid * grid)
        .map(|i| {
            let (tx, ty) = (i % grid, i / grid);
            tile_lut(src, w, h, (tx * tile_w, ty * tile_h), (tile_w, tile_h), clip_limit)
        })
        .collect();

    interpolate(plane, &luts, grid, tile_w, tile_h)
}

/// Build the lookup table of one tile from its clipped histogram.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap
)]
fn tile_lut(
    src: &[u8],
    w: usize,
    h: usize,
    origin: (usize, usize),
    size: (usize, usize),
    clip_limit: f32,
) -> Lut {
    let (x0, y0) = origin;
    let (tile_w, tile_h) = size;
    let area = tile_w * tile_h;

    let mut hist = [0_usize; HIST_SIZE];
    for ty in y0..y0 + tile_h {
        let sy = reflect101(ty as isize, h);
        let row = &src[sy * w..(sy + 1) * w];
        for tx in x0..x0 + tile_w {
            let sx = reflect101(tx as isize, w);
            hist[usize::from(row[sx])] += 1;
        }
    }

    if clip_limit > 0.0 {
        let limit = ((clip_limit * area as f32 / HIST_SIZE as f32) as usize).max(1);
        let mut clipped = 0;
        for bin in &mut hist {
            if *bin > limit {
                clipped += *bin - limit;
                *bin = limit;
            }
        }

        let batch = clipped / HIST_SIZE;
        let mut residual = clipped % HIST_SIZE;
        for bin in &mut hist {
            *bin += batch;
        }
        if residual > 0 {
            let step = (HIST_SIZE / residual).max(1);
            let mut i = 0;
            while i < HIST_SIZE && residual > 0 {
                hist[i] += 1;
                residual -= 1;
                i += step;
            }
        }
    }

    let scale = 255.0 / area as f32;
    let mut lut = [0_u8; HIST_SIZE];
    let mut cumulative = 0;
    for (entry, &count) in lut.iter_mut().zip(hist.iter()) {
        cumulative += count;
        *entry = (cumulative as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Neighboring tile indices and the weight of the second one for a
/// pixel coordinate, given the reciprocal tile size.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn tile_neighbors(coord: u32, inv_tile: f32, last: usize) -> (usize, usize, f32) {
    let tf = (coord as f32).mul_add(inv_tile, -0.5);
    let t1 = tf.floor();
    let weight = tf - t1;
    let t1 = t1 as isize;
    #[allow(clippy::cast_sign_loss)]
    let clamp = |t: isize| (t.max(0) as usize).min(last);
    (clamp(t1), clamp(t1 + 1), weight)
}

/// Blend the four nearest tile lookup tables for every pixel.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn interpolate(plane: &GrayImage, luts: &[Lut], grid: usize, tile_w: usize, tile_h: usize) -> GrayImage {
    let inv_tw = 1.0 / tile_w as f32;
    let inv_th = 1.0 / tile_h as f32;
    let last = grid - 1;

    // Horizontal neighbors and weights depend only on x.
    let columns: Vec<(usize, usize, f32)> = (0..plane.width())
        .map(|x| tile_neighbors(x, inv_tw, last))
        .collect();

    GrayImage::from_fn(plane.width(), plane.height(), |x, y| {
        let (ty1, ty2, ya) = tile_neighbors(y, inv_th, last);
        let (tx1, tx2, xa) = columns[x as usize];
        let v = usize::from(plane.get_pixel(x, y).0[0]);

        let at = |ty: usize, tx: usize| f32::from(luts[ty * grid + tx][v]);
        let top = (at(ty1, tx2) - at(ty1, tx1)).mul_add(xa, at(ty1, tx1));
        let bottom = (at(ty2, tx2) - at(ty2, tx1)).mul_add(xa, at(ty2, tx1));
        let value = (bottom - top).mul_add(ya, top);
        image::Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}

/// Apply CLAHE to the L plane of a Lab image.
///
/// The returned image shares nothing with the input, but its `a` and `b`
/// planes are exact copies.
#[must_use = "returns the enhanced Lab image"]
pub fn equalize_lab(lab: &LabImage, grid: u32, clip_limit: f32) -> LabImage {
    LabImage {
        l: equalize_plane(&lab.l, grid, clip_limit),
        a: lab.a.clone(),
        b: lab.b.clone(),
    }
}

/// Enhance local contrast of an RGB image through its Lab luminance.
#[must_use = "returns the contrast-enhanced image"]
pub fn enhance_contrast(image: &RgbImage, grid: u32, clip_limit: f32) -> RgbImage {
    let lab = color::rgb_to_lab(image);
    let enhanced = equalize_lab(&lab, grid, clip_limit);
    color::lab_to_rgb(&enhanced)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(img: &GrayImage) -> u8 {
        let min = img.pixels().map(|p| p.0[0]).min().unwrap_or(0);
        let max = img.pixels().map(|p| p.0[0]).max().unwrap_or(0);
        max - min
    }

    #[allow(clippy::cast_possible_truncation)]
    fn low_contrast_plane(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| image::Luma([100 + ((x * 7 + y * 3) % 21) as u8]))
    }

    #[test]
    fn tile_neighbors_clamp_at_edges() {
        // Tile size 8: pixel 0 sits before the first tile center.
        assert_eq!(tile_neighbors(0, 1.0 / 8.0, 7).0, 0);
        assert_eq!(tile_neighbors(0, 1.0 / 8.0, 7).1, 0);
        let (a, b, w) = tile_neighbors(12, 1.0 / 8.0, 7);
        assert_eq!((a, b), (1, 2));
        assert!((w - 0.0).abs() < 1e-6);
        let (a, b, _) = tile_neighbors(63, 1.0 / 8.0, 7);
        assert_eq!((a, b), (7, 7));
    }

    #[test]
    fn reflect101_maps_out_of_range() {
        assert_eq!(reflect101(-1, 5), 1);
        assert_eq!(reflect101(-2, 5), 2);
        assert_eq!(reflect101(5, 5), 3);
        assert_eq!(reflect101(6, 5), 2);
        assert_eq!(reflect101(3, 5), 3);
        assert_eq!(reflect101(7, 1), 0);
    }

    #[test]
    fn output_dimensions_preserved_for_uneven_sizes() {
        for (w, h) in [(64, 64), (37, 19), (5, 3), (1, 1)] {
            let plane = low_contrast_plane(w, h);
            let out = equalize_plane(&plane, 8, 2.0);
            assert_eq!(out.dimensions(), (w, h));
        }
    }

    #[test]
    fn low_contrast_range_is_stretched() {
        let plane = low_contrast_plane(64, 64);
        let out = equalize_plane(&plane, 8, 2.0);
        assert!(
            range(&out) > range(&plane) * 2,
            "expected stretched range, before={} after={}",
            range(&plane),
            range(&out),
        );
    }

    #[test]
    fn ordering_within_a_tile_is_preserved() {
        // Single tile: the mapping is one monotonic lookup table.
        let plane = low_contrast_plane(16, 16);
        let out = equalize_plane(&plane, 1, 2.0);
        let mut pairs: Vec<(u8, u8)> = plane
            .pixels()
            .zip(out.pixels())
            .map(|(i, o)| (i.0[0], o.0[0]))
            .collect();
        pairs.sort_unstable();
        for w in pairs.windows(2) {
            assert!(w[0].1 <= w[1].1, "non-monotonic mapping: {w:?}");
        }
    }

    #[test]
    fn chrominance_planes_untouched() {
        let img = RgbImage::from_fn(40, 24, |x, y| {
            image::Rgb([
                u8::try_from((x * 6) % 256).unwrap_or(0),
                u8::try_from((y * 10 + 30) % 256).unwrap_or(0),
                u8::try_from((x * 3 + y * 5) % 256).unwrap_or(0),
            ])
        });
        let lab = color::rgb_to_lab(&img);
        let enhanced = equalize_lab(&lab, 8, 2.0);
        assert_eq!(enhanced.a, lab.a);
        assert_eq!(enhanced.b, lab.b);
        assert_ne!(enhanced.l, lab.l);
    }

    #[test]
    fn enhance_contrast_preserves_dimensions() {
        let img = RgbImage::from_pixel(23, 11, image::Rgb([90, 140, 60]));
        let out = enhance_contrast(&img, 8, 2.0);
        assert_eq!(out.dimensions(), (23, 11));
    }
}
