//! Contrast enhancement and binarisation.
//!
//! [`equalize_adaptive`] is contrast-limited adaptive histogram equalisation
//! (CLAHE): the image is cut into a grid of tiles, each tile gets a clipped
//! and redistributed histogram, and every pixel is mapped through a
//! bilinear blend of the four nearest tile lookup tables.
//!
//! [`binarize`] blurs away speckle and then thresholds each pixel against a
//! Gaussian-weighted local mean.

use image::{GrayImage, Luma};
use imageproc::filter::gaussian_blur_f32;

/// Tiles per axis.
pub const CLAHE_GRID: u32 = 8;
/// Histogram clip limit relative to a uniform histogram.
pub const CLAHE_CLIP_LIMIT: f32 = 2.0;

/// Pre-threshold blur (equivalent to a 5×5 Gaussian kernel).
const SPECKLE_SIGMA: f32 = 1.1;
/// Local-mean window (equivalent to an 11×11 Gaussian kernel).
const THRESHOLD_SIGMA: f32 = 2.0;
/// Constant subtracted from the local mean.
const THRESHOLD_OFFSET: i16 = 2;

/// Contrast-limited adaptive histogram equalisation over a `grid × grid`
/// tiling. A `clip_limit` of 0 disables clipping.
pub fn equalize_adaptive(image: &GrayImage, grid: u32, clip_limit: f32) -> GrayImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return image.clone();
    }
    let tiles_x = grid.clamp(1, w);
    let tiles_y = grid.clamp(1, h);
    let tile_w = w.div_ceil(tiles_x);
    let tile_h = h.div_ceil(tiles_y);

    // Tiles past the right or bottom edge read a mirrored border, so every
    // tile has the same area.
    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let xs = tx * tile_w..(tx + 1) * tile_w;
            let ys = ty * tile_h..(ty + 1) * tile_h;
            luts.push(tile_lut(image, xs, ys, clip_limit));
        }
    }
    let lut = |tx: u32, ty: u32| &luts[(ty * tiles_x + tx) as usize];

    GrayImage::from_fn(w, h, |x, y| {
        let (tx0, tx1, ax) = neighbours(x, tile_w, tiles_x);
        let (ty0, ty1, ay) = neighbours(y, tile_h, tiles_y);
        let v = image.get_pixel(x, y).0[0] as usize;

        let top = f32::from(lut(tx0, ty0)[v]) * (1.0 - ax) + f32::from(lut(tx1, ty0)[v]) * ax;
        let bottom = f32::from(lut(tx0, ty1)[v]) * (1.0 - ax) + f32::from(lut(tx1, ty1)[v]) * ax;
        Luma([(top * (1.0 - ay) + bottom * ay).round().clamp(0.0, 255.0) as u8])
    })
}

/// Mirror a coordinate past the end of an axis back inside it, without
/// repeating the edge pixel.
fn reflect(pos: u32, len: u32) -> u32 {
    if pos < len {
        pos
    } else {
        (2 * (len - 1)).saturating_sub(pos)
    }
}

/// The two tiles whose centres bracket `pos` along one axis, and the
/// weight of the second.
fn neighbours(pos: u32, tile: u32, tiles: u32) -> (u32, u32, f32) {
    let f = (pos as f32 + 0.5) / tile as f32 - 0.5;
    if f <= 0.0 {
        return (0, 0, 0.0);
    }
    let t0 = (f.floor() as u32).min(tiles - 1);
    let t1 = (t0 + 1).min(tiles - 1);
    let a = if t0 == t1 { 0.0 } else { f - t0 as f32 };
    (t0, t1, a.clamp(0.0, 1.0))
}

fn tile_lut(
    image: &GrayImage,
    xs: std::ops::Range<u32>,
    ys: std::ops::Range<u32>,
    clip_limit: f32,
) -> [u8; 256] {
    let (w, h) = image.dimensions();
    let mut hist = [0u32; 256];
    for y in ys.clone() {
        for x in xs.clone() {
            hist[image.get_pixel(reflect(x, w), reflect(y, h)).0[0] as usize] += 1;
        }
    }
    let area = (xs.len() * ys.len()) as u32;

    if clip_limit > 0.0 {
        let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);
        let mut excess = 0u32;
        for bin in hist.iter_mut() {
            if *bin > limit {
                excess += *bin - limit;
                *bin = limit;
            }
        }
        let each = excess / 256;
        let mut residual = excess % 256;
        for bin in hist.iter_mut() {
            *bin += each;
        }
        // Spread the remainder evenly across the range.
        if residual > 0 {
            let step = (256 / residual).max(1) as usize;
            let mut i = 0;
            while i < 256 && residual > 0 {
                hist[i] += 1;
                residual -= 1;
                i += step;
            }
        }
    }

    let scale = 255.0 / area.max(1) as f32;
    let mut lut = [0u8; 256];
    let mut cdf = 0u32;
    for (v, count) in hist.iter().enumerate() {
        cdf += count;
        lut[v] = (cdf as f32 * scale).round().min(255.0) as u8;
    }
    lut
}

/// Two-level image: 255 where a pixel is brighter than its Gaussian local
/// mean minus a small offset, 0 elsewhere.
pub fn binarize(image: &GrayImage) -> GrayImage {
    if image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    let smoothed = gaussian_blur_f32(image, SPECKLE_SIGMA);
    let local_mean = gaussian_blur_f32(&smoothed, THRESHOLD_SIGMA);

    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let v = i16::from(smoothed.get_pixel(x, y).0[0]);
        let t = i16::from(local_mean.get_pixel(x, y).0[0]) - THRESHOLD_OFFSET;
        Luma([if v > t { 255 } else { 0 }])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_tile_lut_is_monotone() {
        let img = GrayImage::from_pixel(16, 16, Luma([100]));
        let lut = tile_lut(&img, 0..16, 0..16, CLAHE_CLIP_LIMIT);
        assert!(lut.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(lut[255], 255);
    }

    #[test]
    fn flat_image_maps_to_flat_image() {
        let img = GrayImage::from_pixel(64, 48, Luma([90]));
        let out = equalize_adaptive(&img, CLAHE_GRID, CLAHE_CLIP_LIMIT);
        assert_eq!(out.dimensions(), (64, 48));
        let first = out.get_pixel(0, 0).0[0];
        assert!(out.pixels().all(|p| p.0[0] == first));
    }

    #[test]
    fn narrow_uneven_image_stays_flat() {
        // 49 and 120 do not divide evenly into eight tiles.
        let img = GrayImage::from_pixel(49, 120, Luma([200]));
        let out = equalize_adaptive(&img, CLAHE_GRID, CLAHE_CLIP_LIMIT);
        let first = out.get_pixel(0, 0).0[0];
        assert!(out.pixels().all(|p| p.0[0] == first));
    }

    #[test]
    fn reflect_mirrors_past_the_edge() {
        assert_eq!(reflect(48, 49), 48);
        assert_eq!(reflect(49, 49), 47);
        assert_eq!(reflect(55, 49), 41);
        assert_eq!(reflect(3, 1), 0);
    }

    #[test]
    fn narrow_strip_keeps_dark_text_dark() {
        let mut img = GrayImage::from_pixel(50, 300, Luma([220]));
        for y in 100..104 {
            for x in 0..50 {
                img.put_pixel(x, y, Luma([30]));
            }
        }
        let out = equalize_adaptive(&img, CLAHE_GRID, CLAHE_CLIP_LIMIT);
        let paper = out.get_pixel(45, 20).0[0];
        assert_eq!(out.get_pixel(0, 20).0[0], paper);
        assert!(out.get_pixel(48, 101).0[0] < paper);
    }

    #[test]
    fn equalization_stretches_low_contrast() {
        let img = GrayImage::from_fn(64, 64, |x, y| Luma([if (x + y) % 2 == 0 { 120 } else { 130 }]));
        let out = equalize_adaptive(&img, CLAHE_GRID, CLAHE_CLIP_LIMIT);
        let (lo, hi) = out
            .pixels()
            .fold((255u8, 0u8), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
        assert!(hi - lo > 10, "range {lo}..{hi}");
    }

    #[test]
    fn tiny_image_uses_fewer_tiles() {
        let img = GrayImage::from_pixel(3, 2, Luma([50]));
        let out = equalize_adaptive(&img, CLAHE_GRID, CLAHE_CLIP_LIMIT);
        assert_eq!(out.dimensions(), (3, 2));
    }

    #[test]
    fn binarize_is_two_level_and_keeps_dark_text() {
        let mut img = GrayImage::from_pixel(60, 60, Luma([230]));
        for y in 25..35 {
            for x in 10..50 {
                img.put_pixel(x, y, Luma([20]));
            }
        }
        let out = binarize(&img);
        assert!(out.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
        assert_eq!(out.get_pixel(30, 26).0[0], 0);
        assert_eq!(out.get_pixel(5, 5).0[0], 255);
    }
}
