//! Skew correction by line-angle voting.
//!
//! 1. Canny edge map (thresholds 50/150).
//! 2. Standard Hough transform (1 px × 1° resolution, vote threshold 100).
//!    Peaks are local maxima of the accumulator, ranked by votes; the 20
//!    strongest take part in the vote.
//! 3. Each peak's line direction is folded so that a near-horizontal line
//!    reads as its deviation from 0°: `< 45°` kept, `> 135°` minus 180°,
//!    anything else discarded.
//! 4. If `|median| > 0.5°` the image is rotated by `-median` about its
//!    centre onto an expanded canvas (Catmull-Rom bicubic, replicated
//!    border).
//!
//! Angles are measured in image coordinates (y grows downwards), so a
//! positive angle is a clockwise tilt on screen.

use crate::error::OcrError;
use image::{GrayImage, Luma};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, info, warn};

/// Below this absolute median angle (degrees) the page counts as upright.
pub const SKEW_TOLERANCE_DEG: f64 = 0.5;

const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;
const HOUGH_VOTE_THRESHOLD: u32 = 100;
const MAX_VOTING_LINES: usize = 20;
const THETA_BINS: usize = 180;

/// Result of measuring a page's skew.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SkewEstimate {
    /// No near-horizontal line reached the vote threshold.
    NoLines,
    /// Median angle within tolerance; the page is left alone.
    Upright(f64),
    /// Median angle (degrees) that should be undone.
    Skewed(f64),
}

/// Straighten `image`, or hand it back unchanged when it is upright, when
/// no lines are found, or when the stage fails.
pub fn correct_skew(image: GrayImage) -> GrayImage {
    let attempt = catch_unwind(AssertUnwindSafe(|| try_correct_skew(&image)));
    match attempt {
        Ok(Ok(Some(rotated))) => rotated,
        Ok(Ok(None)) => image,
        Ok(Err(e)) => {
            warn!("deskew skipped: {}", e);
            image
        }
        Err(_) => {
            warn!("deskew panicked; continuing with the unrotated image");
            image
        }
    }
}

fn try_correct_skew(image: &GrayImage) -> Result<Option<GrayImage>, OcrError> {
    match estimate_skew(image)? {
        SkewEstimate::NoLines => {
            debug!("deskew: no line candidates");
            Ok(None)
        }
        SkewEstimate::Upright(angle) => {
            debug!("deskew: median {:.2}° within tolerance", angle);
            Ok(None)
        }
        SkewEstimate::Skewed(angle) => {
            info!("Deskewing by {:.2} degrees", angle);
            Ok(Some(rotate_expand(image, -angle)))
        }
    }
}

/// Measure the dominant near-horizontal line angle of `image`.
pub fn estimate_skew(image: &GrayImage) -> Result<SkewEstimate, OcrError> {
    if image.width() < 3 || image.height() < 3 {
        return Err(OcrError::Normalization(format!(
            "image too small for edge detection ({}x{})",
            image.width(),
            image.height()
        )));
    }

    let edges = imageproc::edges::canny(image, CANNY_LOW, CANNY_HIGH);
    let angles: Vec<f64> = strongest_lines(&edges, HOUGH_VOTE_THRESHOLD, MAX_VOTING_LINES)
        .into_iter()
        .filter_map(|normal_deg| fold_angle(line_direction(normal_deg)))
        .collect();

    let Some(median) = median(angles) else {
        return Ok(SkewEstimate::NoLines);
    };
    if median.abs() > SKEW_TOLERANCE_DEG {
        Ok(SkewEstimate::Skewed(median))
    } else {
        Ok(SkewEstimate::Upright(median))
    }
}

/// Direction of a Hough line (degrees in `[0, 180)`) from its normal angle.
pub fn line_direction(normal_deg: f64) -> f64 {
    (normal_deg + 90.0).rem_euclid(180.0)
}

/// Fold a line direction so near-horizontal lines read as their deviation
/// from 0°. Returns `None` for lines that are not horizontal candidates.
pub fn fold_angle(direction_deg: f64) -> Option<f64> {
    if direction_deg < 45.0 {
        Some(direction_deg)
    } else if direction_deg > 135.0 {
        Some(direction_deg - 180.0)
    } else {
        None
    }
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

/// Normal angles (degrees) of the `limit` strongest Hough lines in `edges`.
///
/// The accumulator uses `rho = x·cosθ + y·sinθ` with θ in `[0°, 180°)`.
/// A bin is a peak when it reaches `threshold` and beats its four
/// neighbours (strictly on the low side, ties allowed on the high side).
fn strongest_lines(edges: &GrayImage, threshold: u32, limit: usize) -> Vec<f64> {
    let (w, h) = edges.dimensions();
    let offset = (w + h) as i64;
    let rho_bins = (2 * offset + 1) as usize;

    let trig: Vec<(f64, f64)> = (0..THETA_BINS)
        .map(|t| {
            let theta = (t as f64).to_radians();
            (theta.cos(), theta.sin())
        })
        .collect();

    // Row-major by theta so each theta strip is contiguous.
    let mut acc = vec![0u32; THETA_BINS * rho_bins];
    for (x, y, px) in edges.enumerate_pixels() {
        if px.0[0] == 0 {
            continue;
        }
        let (xf, yf) = (f64::from(x), f64::from(y));
        for (t, (cos, sin)) in trig.iter().enumerate() {
            let rho = (xf * cos + yf * sin).round() as i64 + offset;
            acc[t * rho_bins + rho as usize] += 1;
        }
    }

    let at = |t: usize, r: usize| acc[t * rho_bins + r];
    let mut peaks: Vec<(u32, usize)> = Vec::new();
    for t in 0..THETA_BINS {
        for r in 0..rho_bins {
            let votes = at(t, r);
            if votes < threshold {
                continue;
            }
            let left = if r > 0 { at(t, r - 1) } else { 0 };
            let right = if r + 1 < rho_bins { at(t, r + 1) } else { 0 };
            let up = if t > 0 { at(t - 1, r) } else { 0 };
            let down = if t + 1 < THETA_BINS { at(t + 1, r) } else { 0 };
            if votes > left && votes >= right && votes > up && votes >= down {
                peaks.push((votes, t));
            }
        }
    }

    peaks.sort_by(|a, b| b.0.cmp(&a.0));
    peaks
        .into_iter()
        .take(limit)
        .map(|(_, t)| t as f64)
        .collect()
}

/// Rotate `image` by `angle_deg` about its centre onto a canvas large enough
/// to hold every corner. Out-of-range samples replicate the nearest edge.
pub fn rotate_expand(image: &GrayImage, angle_deg: f64) -> GrayImage {
    let (w, h) = image.dimensions();
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    let (abs_sin, abs_cos) = (sin.abs(), cos.abs());
    let new_w = ((f64::from(h) * abs_sin + f64::from(w) * abs_cos) as u32).max(1);
    let new_h = ((f64::from(h) * abs_cos + f64::from(w) * abs_sin) as u32).max(1);

    let (cx, cy) = (f64::from(w) / 2.0, f64::from(h) / 2.0);
    let (ncx, ncy) = (f64::from(new_w) / 2.0, f64::from(new_h) / 2.0);

    GrayImage::from_fn(new_w, new_h, |x, y| {
        let dx = f64::from(x) + 0.5 - ncx;
        let dy = f64::from(y) + 0.5 - ncy;
        // Inverse mapping: rotate the destination point back by -angle.
        let sx = cos * dx + sin * dy + cx - 0.5;
        let sy = -sin * dx + cos * dy + cy - 0.5;
        Luma([sample_bicubic_clamped(image, sx, sy)])
    })
}

/// Catmull-Rom weights for the four taps at offsets -1, 0, 1, 2 from the
/// sample's integer position, given its fractional part `t`.
fn catmull_rom_weights(t: f64) -> [f64; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    [
        (-t3 + 2.0 * t2 - t) / 2.0,
        (3.0 * t3 - 5.0 * t2 + 2.0) / 2.0,
        (-3.0 * t3 + 4.0 * t2 + t) / 2.0,
        (t3 - t2) / 2.0,
    ]
}

fn sample_bicubic_clamped(image: &GrayImage, x: f64, y: f64) -> u8 {
    let (w, h) = image.dimensions();
    let x = x.clamp(0.0, f64::from(w - 1));
    let y = y.clamp(0.0, f64::from(h - 1));
    let (x0, y0) = (x.floor(), y.floor());
    let wx = catmull_rom_weights(x - x0);
    let wy = catmull_rom_weights(y - y0);

    // Taps outside the image replicate the nearest edge pixel.
    let tap = |base: f64, i: usize, len: u32| {
        (base as i64 + i as i64 - 1).clamp(0, i64::from(len) - 1) as u32
    };
    let mut acc = 0.0;
    for (j, wy) in wy.iter().enumerate() {
        let py = tap(y0, j, h);
        let row: f64 = wx
            .iter()
            .enumerate()
            .map(|(i, wx)| wx * f64::from(image.get_pixel(tap(x0, i, w), py).0[0]))
            .sum();
        acc += wy * row;
    }
    acc.round().clamp(0.0, 255.0) as u8
}
