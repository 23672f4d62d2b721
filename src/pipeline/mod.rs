//! Pipeline stages for document digitisation.
//!
//! Each submodule implements one transformation step and is testable on its
//! own. [`DocumentPipeline`] composes them for one staged file.
//!
//! ## Data Flow
//!
//! ```text
//! sniff ──▶ split ──▶ normalize ──▶ recognize
//! (magic)   (pdfium)  (6 stages)    (engine)
//! ```
//!
//! 1. [`sniff`]: classify the staged file by magic bytes
//! 2. [`split`]: one raw image per page, pdfium for PDFs
//! 3. [`normalize`]: resize, grayscale, denoise, [`deskew`], [`contrast`]
//!    enhancement and binarisation
//! 4. [`recognize`]: engine passes, token filtering, weighted confidence
//!
//! Every stage here is blocking. The job orchestrator calls
//! [`DocumentPipeline::process`] from `spawn_blocking`.

pub mod contrast;
pub mod deskew;
pub mod normalize;
pub mod recognize;
pub mod sniff;
pub mod split;

use crate::config::ServiceConfig;
use crate::engine::{FixedLanguage, RecognitionEngine, RecognitionOptions, TesseractEngine};
use crate::error::OcrError;
use crate::output::PageResult;
use normalize::Normalizer;
use recognize::RecognitionAdapter;
use sniff::SourceKind;
use split::PageSplitter;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Split → normalise → recognise for one staged file.
pub struct DocumentPipeline {
    splitter: PageSplitter,
    normalizer: Normalizer,
    adapter: RecognitionAdapter,
}

impl DocumentPipeline {
    pub fn new(splitter: PageSplitter, normalizer: Normalizer, adapter: RecognitionAdapter) -> Self {
        Self {
            splitter,
            normalizer,
            adapter,
        }
    }

    /// Production wiring: pdfium rasteriser, Tesseract engine, fixed language.
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::with_engine(
            config,
            Arc::new(TesseractEngine::new(&config.tesseract_bin)),
            PageSplitter::from_config(config),
        )
    }

    /// Wire `engine` and `splitter` with the rest taken from `config`.
    pub fn with_engine(
        config: &ServiceConfig,
        engine: Arc<dyn RecognitionEngine>,
        splitter: PageSplitter,
    ) -> Self {
        let adapter = RecognitionAdapter::new(
            engine,
            Arc::new(FixedLanguage(config.default_language.clone())),
            RecognitionOptions {
                args: config.engine_arg_list(),
            },
        );
        Self::new(splitter, Normalizer::from_config(config), adapter)
    }

    pub fn engine(&self) -> &Arc<dyn RecognitionEngine> {
        self.adapter.engine()
    }

    /// Every page of `path`, in page order. The first failing page aborts
    /// the file.
    pub fn process(
        &self,
        path: &Path,
        file_name: &str,
        kind: SourceKind,
    ) -> Result<Vec<PageResult>, OcrError> {
        let pages = self.splitter.split(path, file_name, kind)?;
        let mut results = Vec::with_capacity(pages.len());
        for page in pages {
            let normalized = self.normalizer.normalize(&page.image)?;
            let recognition = self.adapter.recognize(&normalized, None)?;
            info!(
                "{}: {} chars, confidence {:.2}",
                page.source_name,
                recognition.full_text.chars().count(),
                recognition.confidence
            );
            results.push(recognition.into_page(page.source_name, page.page_number));
        }
        Ok(results)
    }
}
