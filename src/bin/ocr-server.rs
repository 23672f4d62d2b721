//! HTTP server binary for ocr-digitizer.
//!
//! A thin shim over the library crate that maps CLI flags (each with an
//! environment-variable fallback) to `ServiceConfig` and serves the API.

use anyhow::{Context, Result};
use clap::Parser;
use ocr_digitizer::engine::tesseract::is_legacy_version;
use ocr_digitizer::{api, DocumentPipeline, JobOrchestrator, ServiceConfig};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve on the default port (8000)
  ocr-server

  # Larger batches, German text, lower PDF resolution
  ocr-server --max-batch-size 20 --language deu --pdf-dpi 200

  # Custom tesseract and pdfium locations
  ocr-server --tesseract-bin /opt/tesseract/bin/tesseract \
             --pdfium-lib-path /opt/pdfium/lib

ENDPOINTS:
  POST   /api/ocr/upload           multipart field "files"
  GET    /api/ocr/result/:job_id   poll a job
  DELETE /api/ocr/job/:job_id      forget a job
  GET    /api/health               engine version (503 if unavailable)
  GET    /api/supported-formats    accepted types and limits

REQUIREMENTS:
  tesseract-ocr on PATH (or --tesseract-bin) with the language packs you use.
  A pdfium shared library for PDF uploads (system-wide or PDFIUM_LIB_PATH).
"#;

/// Serve scanned-document OCR over HTTP.
#[derive(Parser, Debug)]
#[command(
    name = "ocr-server",
    version,
    about = "Serve scanned-document OCR over HTTP",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Bind address.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Bind port.
    #[arg(short, long, env = "PORT", default_value_t = 8000)]
    port: u16,

    /// Maximum size of one uploaded file, in bytes.
    #[arg(long, env = "MAX_FILE_SIZE", default_value_t = 10 * 1024 * 1024)]
    max_file_size: usize,

    /// Maximum number of files per upload.
    #[arg(long, env = "MAX_BATCH_SIZE", default_value_t = 10)]
    max_batch_size: usize,

    /// Directory for staged uploads. Purged at startup and shutdown.
    #[arg(long, env = "UPLOAD_DIR", default_value = "uploads")]
    upload_dir: PathBuf,

    /// Extra tesseract arguments.
    #[arg(long, env = "TESSERACT_CONFIG", default_value = "--psm 6", allow_hyphen_values = true)]
    tesseract_config: String,

    /// Recognition language.
    #[arg(long, env = "OCR_LANGUAGE", default_value = "eng")]
    language: String,

    /// Path to the tesseract executable.
    #[arg(long, env = "TESSERACT_BIN", default_value = "tesseract")]
    tesseract_bin: PathBuf,

    /// Upper bound on the longest edge of a normalised image.
    #[arg(long, env = "MAX_IMAGE_DIMENSION", default_value_t = 3000)]
    max_image_dimension: u32,

    /// Lower bound on the shortest edge of a normalised image.
    #[arg(long, env = "MIN_IMAGE_DIMENSION", default_value_t = 300)]
    min_image_dimension: u32,

    /// PDF rasterisation DPI (72–600).
    #[arg(long, env = "PDF_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    pdf_dpi: u32,

    /// Path to libpdfium (file or directory). Uses the system library if unset.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Jobs kept in memory before the oldest are evicted.
    #[arg(long, env = "MAX_JOBS_IN_MEMORY", default_value_t = 100)]
    max_jobs_in_memory: usize,

    /// Oldest jobs dropped per eviction.
    #[arg(long, env = "JOB_CLEANUP_BATCH_SIZE", default_value_t = 50)]
    job_cleanup_batch_size: usize,

    /// Batches processed concurrently.
    #[arg(long, env = "MAX_CONCURRENT_JOBS", default_value_t = 4)]
    max_concurrent_jobs: usize,

    /// Allowed CORS origins, comma separated.
    #[arg(
        long,
        env = "CORS_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:3000,http://127.0.0.1:3000"
    )]
    cors_origins: Vec<String>,

    /// Log level when RUST_LOG is unset (error, warn, info, debug, trace).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Cli {
    fn to_config(&self) -> Result<ServiceConfig> {
        let mut builder = ServiceConfig::builder()
            .host(self.host.clone())
            .port(self.port)
            .max_file_size(self.max_file_size)
            .max_batch_size(self.max_batch_size)
            .upload_dir(self.upload_dir.clone())
            .engine_args(self.tesseract_config.clone())
            .default_language(self.language.clone())
            .tesseract_bin(self.tesseract_bin.clone())
            .image_dimension_bounds(self.min_image_dimension, self.max_image_dimension)
            .pdf_dpi(self.pdf_dpi)
            .max_resident_jobs(self.max_jobs_in_memory)
            .eviction_batch_size(self.job_cleanup_batch_size)
            .max_concurrent_jobs(self.max_concurrent_jobs)
            .cors_origins(self.cors_origins.iter().map(|o| o.trim().to_string()));
        if let Some(path) = &self.pdfium_lib_path {
            builder = builder.pdfium_lib_path(path.clone());
        }
        builder.build().context("Invalid configuration")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new(format!("{},tower_http=info", cli.log_level))
            }),
        )
        .with_writer(io::stderr)
        .init();

    let config = Arc::new(cli.to_config()?);

    // ── Staging directory ────────────────────────────────────────────────
    purge_upload_dir(&config.upload_dir);
    std::fs::create_dir_all(&config.upload_dir).with_context(|| {
        format!(
            "Failed to create upload directory {}",
            config.upload_dir.display()
        )
    })?;

    // ── Engine diagnostics ───────────────────────────────────────────────
    let pipeline = Arc::new(DocumentPipeline::from_config(&config));
    let engine = Arc::clone(pipeline.engine());
    let diagnostics = tokio::task::spawn_blocking(move || {
        (engine.version(), engine.supported_languages())
    })
    .await
    .context("Engine diagnostics task failed")?;
    match diagnostics {
        (Ok(version), langs) => {
            tracing::info!("Tesseract version: {}", version);
            if is_legacy_version(&version) {
                tracing::warn!(
                    "Tesseract {} may not support structured token output; \
                     pages will fall back to a fixed confidence",
                    version
                );
            }
            match langs {
                Ok(langs) => tracing::info!("Available languages: {}", langs.join(", ")),
                Err(e) => tracing::warn!("Could not list languages: {}", e),
            }
        }
        (Err(e), _) => tracing::warn!("Recognition engine unavailable: {}", e),
    }

    // ── Serve ────────────────────────────────────────────────────────────
    let orchestrator = Arc::new(JobOrchestrator::new(Arc::clone(&config), pipeline));
    let app = api::router(api::AppState::new(orchestrator, Arc::clone(&config)));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Starting ocr-server v{} on {}", env!("CARGO_PKG_VERSION"), addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    purge_upload_dir(&config.upload_dir);
    tracing::info!("Shut down cleanly");
    Ok(())
}

/// Remove staged uploads left behind by a previous run.
fn purge_upload_dir(dir: &Path) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    let mut removed = 0usize;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!("Could not remove {}: {}", path.display(), e),
            }
        }
    }
    if removed > 0 {
        tracing::info!("Removed {} staged files from {}", removed, dir.display());
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
