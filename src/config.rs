//! Service configuration.
//!
//! Every tunable of the service lives in [`ServiceConfig`], built through
//! [`ServiceConfigBuilder`]. The binary maps its clap flags (each with an
//! environment-variable fallback) onto the builder; tests construct configs
//! directly with only the fields they care about.

use crate::error::OcrError;
use std::path::PathBuf;

/// Confidence reported for a page whose engine could not produce
/// per-token data (older Tesseract builds).
pub const FALLBACK_CONFIDENCE: f32 = 0.85;

/// Configuration for the OCR service.
///
/// # Example
/// ```rust
/// use ocr_digitizer::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .max_batch_size(5)
///     .pdf_dpi(200)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_batch_size, 5);
/// ```
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Bind address. Default: `0.0.0.0`.
    pub host: String,

    /// Bind port. Default: 8000.
    pub port: u16,

    /// Maximum accepted size of one uploaded file in bytes. Default: 10 MiB.
    pub max_file_size: usize,

    /// Maximum number of files in one upload batch. Default: 10.
    pub max_batch_size: usize,

    /// Directory holding staged uploads until their job has processed them.
    pub upload_dir: PathBuf,

    /// Accepted file extensions, lowercase with leading dot.
    pub supported_extensions: Vec<String>,

    /// MIME types the background task accepts after sniffing.
    pub supported_mime_types: Vec<String>,

    /// Extra engine arguments, whitespace separated. Default: `--psm 6`
    /// (assume a single uniform block of text; also valid on Tesseract 3.x).
    pub engine_args: String,

    /// Language passed to the engine when no detector overrides it.
    pub default_language: String,

    /// Path to the tesseract executable. Default: `tesseract` on `PATH`.
    pub tesseract_bin: PathBuf,

    /// Upper bound on the longest edge of a normalised image. Default: 3000.
    pub max_image_dimension: u32,

    /// Lower bound on the shortest edge of a normalised image. Default: 300.
    pub min_image_dimension: u32,

    /// Rasterisation resolution for PDF pages. Range: 72–600. Default: 300.
    pub pdf_dpi: u32,

    /// Explicit pdfium library path. `None` binds the system library.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Maximum number of jobs kept in memory. Default: 100.
    pub max_resident_jobs: usize,

    /// How many of the oldest jobs are dropped at once when the store is
    /// full. Never fewer than needed to make room. Default: 50.
    pub eviction_batch_size: usize,

    /// How many batches may run their background work at once. Default: 4.
    pub max_concurrent_jobs: usize,

    /// Origins allowed by the CORS layer.
    pub cors_origins: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_file_size: 10 * 1024 * 1024,
            max_batch_size: 10,
            upload_dir: PathBuf::from("uploads"),
            supported_extensions: [".png", ".jpg", ".jpeg", ".webp", ".pdf"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            supported_mime_types: [
                "image/png",
                "image/jpeg",
                "image/jpg",
                "image/webp",
                "application/pdf",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            engine_args: "--psm 6".to_string(),
            default_language: "eng".to_string(),
            tesseract_bin: PathBuf::from("tesseract"),
            max_image_dimension: 3000,
            min_image_dimension: 300,
            pdf_dpi: 300,
            pdfium_lib_path: None,
            max_resident_jobs: 100,
            eviction_batch_size: 50,
            max_concurrent_jobs: 4,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// Engine arguments split into argv items.
    pub fn engine_arg_list(&self) -> Vec<String> {
        self.engine_args
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    /// Whether `filename` carries one of the accepted extensions.
    pub fn is_supported_extension(&self, filename: &str) -> bool {
        match extension_of(filename) {
            Some(ext) => self.supported_extensions.iter().any(|e| *e == ext),
            None => false,
        }
    }

    /// Whether a sniffed MIME type is explicitly accepted.
    pub fn is_supported_mime(&self, mime: &str) -> bool {
        self.supported_mime_types.iter().any(|m| m == mime)
    }

    /// Maximum file size in whole megabytes, as reported to clients.
    pub fn max_file_size_mb(&self) -> usize {
        self.max_file_size / (1024 * 1024)
    }
}

/// Lowercased extension of `filename` including the leading dot.
pub fn extension_of(filename: &str) -> Option<String> {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn max_file_size(mut self, bytes: usize) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    pub fn max_batch_size(mut self, n: usize) -> Self {
        self.config.max_batch_size = n;
        self
    }

    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload_dir = dir.into();
        self
    }

    pub fn supported_extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.supported_extensions = exts.into_iter().map(Into::into).collect();
        self
    }

    pub fn supported_mime_types<I, S>(mut self, mimes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.supported_mime_types = mimes.into_iter().map(Into::into).collect();
        self
    }

    pub fn engine_args(mut self, args: impl Into<String>) -> Self {
        self.config.engine_args = args.into();
        self
    }

    pub fn default_language(mut self, lang: impl Into<String>) -> Self {
        self.config.default_language = lang.into();
        self
    }

    pub fn tesseract_bin(mut self, bin: impl Into<PathBuf>) -> Self {
        self.config.tesseract_bin = bin.into();
        self
    }

    pub fn image_dimension_bounds(mut self, min: u32, max: u32) -> Self {
        self.config.min_image_dimension = min;
        self.config.max_image_dimension = max;
        self
    }

    pub fn pdf_dpi(mut self, dpi: u32) -> Self {
        self.config.pdf_dpi = dpi.clamp(72, 600);
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn max_resident_jobs(mut self, n: usize) -> Self {
        self.config.max_resident_jobs = n;
        self
    }

    pub fn eviction_batch_size(mut self, n: usize) -> Self {
        self.config.eviction_batch_size = n.max(1);
        self
    }

    pub fn max_concurrent_jobs(mut self, n: usize) -> Self {
        self.config.max_concurrent_jobs = n.max(1);
        self
    }

    pub fn cors_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.cors_origins = origins.into_iter().map(Into::into).collect();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, OcrError> {
        let c = &self.config;
        if c.min_image_dimension == 0 || c.min_image_dimension > c.max_image_dimension {
            return Err(OcrError::InvalidConfig(format!(
                "image dimension bounds must satisfy 0 < min <= max, got min={} max={}",
                c.min_image_dimension, c.max_image_dimension
            )));
        }
        if c.max_resident_jobs == 0 {
            return Err(OcrError::InvalidConfig(
                "max_resident_jobs must be ≥ 1".into(),
            ));
        }
        if c.max_batch_size == 0 {
            return Err(OcrError::InvalidConfig("max_batch_size must be ≥ 1".into()));
        }
        if c.max_file_size == 0 {
            return Err(OcrError::InvalidConfig("max_file_size must be ≥ 1".into()));
        }
        if c.default_language.trim().is_empty() {
            return Err(OcrError::InvalidConfig(
                "default_language must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
