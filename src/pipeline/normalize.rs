//! Image normalisation: condition a raw page image for recognition.
//!
//! Stages run in a fixed order:
//!
//! ```text
//! resize ──▶ grayscale ──▶ denoise ──▶ deskew ──▶ contrast ──▶ binarize
//! (cubic)     (luma)     (bilateral)   (hough)     (CLAHE)     (adaptive)
//! ```
//!
//! Every stage except deskew propagates its failure. Deskew falls back to
//! its input (see [`super::deskew::correct_skew`]).
//!
//! The output is always single-channel and strictly two-valued (0 or 255).
//! Its longest edge never exceeds the configured upper bound. The lower
//! bound is applied to the shortest edge only as far as the upper bound
//! allows, so extremely elongated inputs may stay below it.

use super::{contrast, deskew};
use crate::config::ServiceConfig;
use crate::error::OcrError;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use tracing::debug;

/// Bilateral denoise window, in pixels per side.
const DENOISE_WINDOW: u32 = 7;
/// Intensity spread of the bilateral filter. Strokes that differ from
/// the paper by much more than this are left untouched.
const DENOISE_SIGMA_COLOR: f32 = 30.0;
const DENOISE_SIGMA_SPATIAL: f32 = 3.0;

/// Deterministic normalisation pipeline bounded by `[min_dimension, max_dimension]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normalizer {
    min_dimension: u32,
    max_dimension: u32,
}

impl Normalizer {
    /// Create a normaliser. Bounds are expected to satisfy `0 < min <= max`,
    /// which [`ServiceConfig`]'s builder already enforces.
    pub fn new(min_dimension: u32, max_dimension: u32) -> Self {
        Self {
            min_dimension: min_dimension.max(1),
            max_dimension: max_dimension.max(min_dimension).max(1),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(config.min_image_dimension, config.max_image_dimension)
    }

    /// Run all six stages over `image`.
    pub fn normalize(&self, image: &DynamicImage) -> Result<GrayImage, OcrError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(OcrError::Normalization(format!(
                "image has no pixels ({}x{})",
                image.width(),
                image.height()
            )));
        }

        let resized = self.resize(image);
        let gray = resized.to_luma8();
        let denoised = imageproc::filter::bilateral_filter(
            &gray,
            DENOISE_WINDOW,
            DENOISE_SIGMA_COLOR,
            DENOISE_SIGMA_SPATIAL,
        );

        let mut upright = deskew::correct_skew(denoised);
        // Canvas expansion can push the longest edge past the bound again.
        if let Some((w, h)) = shrink_to_fit(upright.width(), upright.height(), self.max_dimension) {
            debug!("re-fitting deskewed image to {}x{}", w, h);
            upright = image::imageops::resize(&upright, w, h, FilterType::CatmullRom);
        }

        let equalized = contrast::equalize_adaptive(
            &upright,
            contrast::CLAHE_GRID,
            contrast::CLAHE_CLIP_LIMIT,
        );
        Ok(contrast::binarize(&equalized))
    }

    fn resize(&self, image: &DynamicImage) -> DynamicImage {
        match fit_dimensions(
            image.width(),
            image.height(),
            self.min_dimension,
            self.max_dimension,
        ) {
            Some((w, h)) => {
                debug!(
                    "resizing {}x{} -> {}x{}",
                    image.width(),
                    image.height(),
                    w,
                    h
                );
                image.resize_exact(w, h, FilterType::CatmullRom)
            }
            None => image.clone(),
        }
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::from_config(&ServiceConfig::default())
    }
}

/// Target dimensions for the resize stage, or `None` when no resize is needed.
///
/// Downscaling brings the longest edge to `max`. Upscaling brings the
/// shortest edge towards `min` without letting the longest edge pass `max`.
pub fn fit_dimensions(width: u32, height: u32, min: u32, max: u32) -> Option<(u32, u32)> {
    let longest = width.max(height);
    let shortest = width.min(height);
    if longest == 0 {
        return None;
    }

    let scale = if longest > max {
        f64::from(max) / f64::from(longest)
    } else if shortest < min {
        let up = f64::from(min) / f64::from(shortest);
        up.min(f64::from(max) / f64::from(longest))
    } else {
        return None;
    };

    let scaled = |d: u32| ((f64::from(d) * scale).round() as u32).clamp(1, max);
    let target = (scaled(width), scaled(height));
    (target != (width, height)).then_some(target)
}

fn shrink_to_fit(width: u32, height: u32, max: u32) -> Option<(u32, u32)> {
    if width.max(height) <= max {
        return None;
    }
    fit_dimensions(width, height, 1, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    fn is_binary(img: &GrayImage) -> bool {
        img.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255)
    }

    /// White page with a few dark text-like bars.
    fn synthetic_page(w: u32, h: u32) -> RgbImage {
        let mut img = RgbImage::from_pixel(w, h, Rgb([235, 232, 228]));
        for row in 0..4 {
            let y0 = h / 6 + row * h / 6;
            for y in y0..(y0 + h / 40).min(h) {
                for x in w / 10..w - w / 10 {
                    if (x / 7) % 3 != 0 {
                        img.put_pixel(x, y, Rgb([20, 20, 25]));
                    }
                }
            }
        }
        img
    }

    #[test]
    fn fit_downscales_to_max() {
        assert_eq!(fit_dimensions(6000, 3000, 300, 3000), Some((3000, 1500)));
    }

    #[test]
    fn fit_upscales_to_min() {
        assert_eq!(fit_dimensions(150, 200, 300, 3000), Some((300, 400)));
    }

    #[test]
    fn fit_upscale_never_exceeds_max() {
        let (w, h) = fit_dimensions(20, 2800, 300, 3000).unwrap();
        assert!(w.max(h) <= 3000);
        assert_eq!(h, 3000);
    }

    #[test]
    fn fit_noop_within_bounds() {
        assert_eq!(fit_dimensions(800, 600, 300, 3000), None);
    }

    #[test]
    fn output_is_binary_and_within_bounds() {
        let normalizer = Normalizer::new(300, 1000);
        let page = DynamicImage::ImageRgb8(synthetic_page(1600, 1200));
        let out = normalizer.normalize(&page).unwrap();
        assert!(out.width().max(out.height()) <= 1000);
        assert!(out.width().min(out.height()) >= 300);
        assert!(is_binary(&out));
    }

    #[test]
    fn small_input_is_upscaled() {
        let normalizer = Normalizer::new(300, 3000);
        let page = DynamicImage::ImageRgb8(synthetic_page(200, 160));
        let out = normalizer.normalize(&page).unwrap();
        assert!(out.width().min(out.height()) >= 300);
        assert!(is_binary(&out));
    }

    #[test]
    fn flat_image_stays_binary() {
        let normalizer = Normalizer::new(300, 3000);
        let page = DynamicImage::ImageLuma8(GrayImage::from_pixel(400, 400, Luma([128])));
        let out = normalizer.normalize(&page).unwrap();
        assert!(is_binary(&out));
        assert_eq!(out.dimensions(), (400, 400));
    }

    #[test]
    fn hairline_stroke_survives() {
        let mut page = GrayImage::from_pixel(400, 400, Luma([240]));
        for x in 50..350 {
            page.put_pixel(x, 200, Luma([10]));
        }
        let out = Normalizer::new(300, 3000)
            .normalize(&DynamicImage::ImageLuma8(page))
            .unwrap();
        assert_eq!(out.dimensions(), (400, 400));
        let dark = (50..350).filter(|&x| out.get_pixel(x, 200).0[0] == 0).count();
        assert!(dark >= 250, "only {dark} of 300 stroke pixels kept");
    }

    #[test]
    fn empty_image_is_rejected() {
        let normalizer = Normalizer::default();
        let page = DynamicImage::ImageLuma8(GrayImage::new(0, 0));
        assert!(matches!(
            normalizer.normalize(&page),
            Err(OcrError::Normalization(_))
        ));
    }
}
