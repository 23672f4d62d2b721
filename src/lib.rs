//! # ocr-digitizer
//!
//! Digitise scanned documents: raster images or multi-page PDFs go in,
//! recognised text with per-word confidences and boxes comes out, behind an
//! asynchronous job API.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Sniff      classify by magic bytes (PDF, PNG, JPEG, WebP, …)
//!  ├─ 2. Split      one image per page; pdfium for PDFs (spawn_blocking)
//!  ├─ 3. Normalize  resize → gray → denoise → deskew → CLAHE → binarize
//!  ├─ 4. Recognize  tesseract text + TSV tokens, weighted confidence
//!  └─ 5. Job        per-file isolation, one terminal write per job
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ocr_digitizer::{api, DocumentPipeline, JobOrchestrator, ServiceConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(ServiceConfig::builder().max_batch_size(5).build()?);
//!     let pipeline = Arc::new(DocumentPipeline::from_config(&config));
//!     let orchestrator = Arc::new(JobOrchestrator::new(Arc::clone(&config), pipeline));
//!     let app = api::router(api::AppState::new(orchestrator, Arc::clone(&config)));
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocr-server` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when embedding the library:
//! ```toml
//! ocr-digitizer = { version = "1.0", default-features = false }
//! ```
//!
//! ## Runtime Requirements
//!
//! * `tesseract` on `PATH` (or configured), with the language packs in use.
//! * A pdfium shared library for PDF uploads.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod output;
pub mod pipeline;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ServiceConfig, ServiceConfigBuilder, FALLBACK_CONFIDENCE};
pub use engine::{FixedLanguage, LanguageDetector, RawToken, RecognitionEngine, TesseractEngine};
pub use error::{EngineError, FileError, OcrError, ValidationError};
pub use jobs::{JobOrchestrator, JobStore, StagedFile};
pub use output::{BoundingBox, Job, JobId, JobOutcome, JobStatus, PageResult, Token};
pub use pipeline::normalize::Normalizer;
pub use pipeline::recognize::RecognitionAdapter;
pub use pipeline::split::{PageRasterizer, PageSplitter, PdfiumRasterizer};
pub use pipeline::DocumentPipeline;
