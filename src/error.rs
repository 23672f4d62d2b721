//! Error types for the ocr-digitizer library.
//!
//! Failures are split by how far they are allowed to travel:
//!
//! * [`OcrError`]: fatal for one operation. A source file cannot be read,
//!   a PDF cannot be rasterised, both recognition passes failed. Returned as
//!   `Err(OcrError)` from the pipeline entry points.
//!
//! * [`FileError`]: non-fatal for the batch. One file of a job was
//!   rejected or failed. Stored on the job (folded into its `error_message`)
//!   so the remaining files keep going.
//!
//! * [`EngineError`]: what the external recognition engine reported. The
//!   recognition adapter decides whether it degrades or escalates.
//!
//! * [`ValidationError`]: submission-time rejection, the only failure
//!   raised synchronously to an HTTP caller (status 400).

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors returned by the pipeline and configuration layers.
#[derive(Debug, Error)]
pub enum OcrError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The staged source file could not be opened or decoded.
    #[error("Could not load source file '{path}': {detail}")]
    SourceUnreadable { path: PathBuf, detail: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password; scanned uploads are never decrypted.
    #[error("PDF '{path}' is encrypted and requires a password")]
    PasswordRequired { path: PathBuf },

    /// The PDF parsed but contains no pages.
    #[error("PDF '{path}' has no pages")]
    EmptyPdf { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Processing errors ─────────────────────────────────────────────────
    /// A normalisation stage (other than deskew) failed.
    #[error("Image normalisation failed: {0}")]
    Normalization(String),

    /// Neither the transcription nor the token pass produced output.
    #[error("Recognition failed: {0}")]
    Recognition(#[source] EngineError),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// A non-fatal error for a single file of a batch.
///
/// Collected by the orchestrator and summarised into the job's
/// `error_message`; one file failing never aborts the rest of the batch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FileError {
    /// The sniffed content type is known and explicitly unsupported.
    #[error("Unsupported MIME type {mime} for file {file}")]
    UnsupportedType { file: String, mime: String },

    /// Splitting, normalisation or recognition failed for this file.
    #[error("Error processing file {file}: {detail}")]
    Processing { file: String, detail: String },
}

/// Errors reported by a [`crate::engine::RecognitionEngine`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine binary is not installed or not on `PATH`.
    #[error("Recognition engine not available: {0}")]
    NotAvailable(String),

    /// The engine ran but exited unsuccessfully.
    #[error("Recognition engine failed: {0}")]
    Failed(String),

    /// The engine's output could not be parsed.
    #[error("Malformed engine output: {0}")]
    MalformedOutput(String),

    #[error("Engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Submission-time validation failures (HTTP 400).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("No files provided")]
    NoFiles,

    #[error("Maximum {max} files allowed per batch (got {count})")]
    TooManyFiles { count: usize, max: usize },

    #[error("Invalid file: {name}. {reason}")]
    InvalidFile { name: String, reason: String },
}
