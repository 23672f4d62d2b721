//! Page splitting: turn one staged file into an ordered list of raw images.
//!
//! Single images load directly through the `image` crate. PDFs are
//! rasterised page by page through a [`PageRasterizer`]; the production one
//! binds pdfium. Rendering is CPU-bound and pdfium keeps thread-local state,
//! so callers run [`PageSplitter::split`] inside `spawn_blocking`.
//!
//! Render scale is `dpi / 72` (PDF user space is 72 units per inch), with the
//! longest edge capped at [`MAX_RENDER_EDGE`] so an oversized page cannot
//! exhaust memory before the normaliser shrinks it.

use super::sniff::SourceKind;
use crate::config::ServiceConfig;
use crate::error::OcrError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Upper bound on either edge of a rendered page, in pixels.
pub const MAX_RENDER_EDGE: i32 = 10_000;

/// One raw page ready for normalisation.
#[derive(Debug, Clone)]
pub struct SourcePage {
    /// Name reported in the result (`"{file} (Page {n})"` for PDFs).
    pub source_name: String,
    /// 1-based page number for multi-page sources.
    pub page_number: Option<usize>,
    pub image: DynamicImage,
}

/// Renders every page of a multi-page document, in order.
pub trait PageRasterizer: Send + Sync {
    fn rasterize(&self, path: &Path, dpi: u32) -> Result<Vec<DynamicImage>, OcrError>;
}

/// [`PageRasterizer`] backed by pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    library_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    /// `library_path` may name the shared library itself or the directory
    /// holding it. `None` binds the system library.
    pub fn new(library_path: Option<PathBuf>) -> Self {
        Self { library_path }
    }

    fn bind(&self) -> Result<Pdfium, OcrError> {
        let bindings = match &self.library_path {
            Some(path) if path.is_dir() => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))
            }
            Some(path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| OcrError::PdfiumBindingFailed(format!("{:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn rasterize(&self, path: &Path, dpi: u32) -> Result<Vec<DynamicImage>, OcrError> {
        let pdfium = self.bind()?;

        let document = pdfium.load_pdf_from_file(path, None).map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.contains("Password") || err_str.contains("password") {
                OcrError::PasswordRequired {
                    path: path.to_path_buf(),
                }
            } else {
                OcrError::CorruptPdf {
                    path: path.to_path_buf(),
                    detail: err_str,
                }
            }
        })?;

        let pages = document.pages();
        info!("PDF loaded: {} pages", pages.len());

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(dpi as f32 / 72.0)
            .set_maximum_width(MAX_RENDER_EDGE)
            .set_maximum_height(MAX_RENDER_EDGE);

        let mut images = Vec::with_capacity(pages.len() as usize);
        for (idx, page) in pages.iter().enumerate() {
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                OcrError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                }
            })?;
            let image = bitmap.as_image();
            debug!(
                "Rendered page {} -> {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            images.push(image);
        }
        Ok(images)
    }
}

/// Splits staged files into [`SourcePage`]s.
#[derive(Clone)]
pub struct PageSplitter {
    rasterizer: Arc<dyn PageRasterizer>,
    dpi: u32,
}

impl PageSplitter {
    pub fn new(rasterizer: Arc<dyn PageRasterizer>, dpi: u32) -> Self {
        Self { rasterizer, dpi }
    }

    /// Splitter with a pdfium rasteriser bound as `config` describes.
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            Arc::new(PdfiumRasterizer::new(config.pdfium_lib_path.clone())),
            config.pdf_dpi,
        )
    }

    /// Load `path` as `kind`. `file_name` is the name the upload arrived with.
    pub fn split(
        &self,
        path: &Path,
        file_name: &str,
        kind: SourceKind,
    ) -> Result<Vec<SourcePage>, OcrError> {
        match kind {
            SourceKind::Image => {
                let image = load_image(path).map_err(|detail| OcrError::SourceUnreadable {
                    path: path.to_path_buf(),
                    detail,
                })?;
                Ok(vec![SourcePage {
                    source_name: file_name.to_string(),
                    page_number: None,
                    image,
                }])
            }
            SourceKind::Pdf => {
                let images = self.rasterizer.rasterize(path, self.dpi)?;
                if images.is_empty() {
                    return Err(OcrError::EmptyPdf {
                        path: path.to_path_buf(),
                    });
                }
                Ok(images
                    .into_iter()
                    .enumerate()
                    .map(|(idx, image)| SourcePage {
                        source_name: format!("{} (Page {})", file_name, idx + 1),
                        page_number: Some(idx + 1),
                        image,
                    })
                    .collect())
            }
        }
    }
}

// Content decides the decoder, not the extension.
fn load_image(path: &Path) -> Result<DynamicImage, String> {
    image::ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| e.to_string())?
        .decode()
        .map_err(|e| e.to_string())
}
