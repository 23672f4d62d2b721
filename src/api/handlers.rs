//! Route handlers.

use super::error::ApiError;
use super::AppState;
use crate::config::{extension_of, ServiceConfig};
use crate::error::ValidationError;
use crate::jobs::StagedFile;
use crate::output::{JobId, JobStatus, PageResult};
use axum::body::Bytes;
use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::Serialize;
use std::io::Write;
use tempfile::TempPath;
use tracing::{error, info};

/// Multipart field carrying the uploaded files.
pub const FILES_FIELD: &str = "files";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub files_count: usize,
}

#[derive(Debug, Serialize)]
pub struct ResultResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub results: Vec<PageResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub tesseract_version: String,
}

#[derive(Debug, Serialize)]
pub struct SupportedFormats {
    pub supported_extensions: Vec<String>,
    pub supported_mime_types: Vec<String>,
    pub max_file_size_mb: usize,
    pub max_batch_size: usize,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// One file as received, before staging.
#[derive(Debug)]
pub struct Upload {
    pub name: String,
    pub data: Bytes,
}

/// `POST /api/ocr/upload`
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut uploads = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::MalformedUpload(e.to_string()))?
    {
        if field.name() != Some(FILES_FIELD) {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::MalformedUpload(e.to_string()))?;
        info!("Validating file: {}", name);
        uploads.push(Upload { name, data });
    }

    validate_batch(&state.config, &uploads)?;

    let files_count = uploads.len();
    let dir = state.config.upload_dir.clone();
    let staged = tokio::task::spawn_blocking(move || stage_all(&dir, uploads))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    let job_id = state.orchestrator.submit(staged);
    Ok(Json(UploadResponse {
        job_id,
        status: JobStatus::Processing,
        files_count,
    }))
}

/// `GET /api/ocr/result/:job_id`
pub async fn result(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<ResultResponse>, ApiError> {
    let id = job_id.parse::<JobId>().map_err(|_| ApiError::JobNotFound)?;
    let job = state.orchestrator.get(&id).ok_or(ApiError::JobNotFound)?;
    Ok(Json(ResultResponse {
        job_id: job.id,
        status: job.status,
        results: job.results,
        error_message: job.error_message,
    }))
}

/// `DELETE /api/ocr/job/:job_id`
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = job_id.parse::<JobId>().map_err(|_| ApiError::JobNotFound)?;
    if !state.orchestrator.delete(&id) {
        return Err(ApiError::JobNotFound);
    }
    Ok(Json(MessageResponse {
        message: "Job deleted successfully",
    }))
}

/// `GET /api/health`
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let engine = state.orchestrator.pipeline().engine().clone();
    let version = tokio::task::spawn_blocking(move || engine.version())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    match version {
        Ok(tesseract_version) => Ok(Json(HealthResponse {
            status: "healthy",
            version: env!("CARGO_PKG_VERSION"),
            tesseract_version,
        })),
        Err(e) => {
            error!("Health check failed: {}", e);
            Err(ApiError::Unhealthy)
        }
    }
}

/// `GET /api/supported-formats`
pub async fn supported_formats(State(state): State<AppState>) -> Json<SupportedFormats> {
    let config = &state.config;
    Json(SupportedFormats {
        supported_extensions: config.supported_extensions.clone(),
        supported_mime_types: config.supported_mime_types.clone(),
        max_file_size_mb: config.max_file_size_mb(),
        max_batch_size: config.max_batch_size,
    })
}

/// Batch-level and per-file checks. Nothing is staged unless every file
/// passes.
pub fn validate_batch(config: &ServiceConfig, uploads: &[Upload]) -> Result<(), ValidationError> {
    if uploads.is_empty() {
        return Err(ValidationError::NoFiles);
    }
    if uploads.len() > config.max_batch_size {
        return Err(ValidationError::TooManyFiles {
            count: uploads.len(),
            max: config.max_batch_size,
        });
    }
    for upload in uploads {
        let acceptable = !upload.name.is_empty()
            && config.is_supported_extension(&upload.name)
            && upload.data.len() <= config.max_file_size;
        if !acceptable {
            return Err(ValidationError::InvalidFile {
                name: upload.name.clone(),
                reason: format!(
                    "Supported formats: {} (max {}MB)",
                    format_list(config),
                    config.max_file_size_mb()
                ),
            });
        }
    }
    Ok(())
}

fn format_list(config: &ServiceConfig) -> String {
    config
        .supported_extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_ascii_uppercase())
        .collect::<Vec<_>>()
        .join(", ")
}

fn stage_all(dir: &std::path::Path, uploads: Vec<Upload>) -> Result<Vec<StagedFile>, ApiError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| ApiError::Internal(format!("cannot create {}: {}", dir.display(), e)))?;
    uploads
        .into_iter()
        .map(|upload| {
            let path = stage(dir, &upload.name, &upload.data).map_err(|e| {
                ApiError::Internal(format!("Error saving file {}: {}", upload.name, e))
            })?;
            Ok(StagedFile::new(upload.name, path))
        })
        .collect()
}

fn stage(dir: &std::path::Path, name: &str, data: &[u8]) -> std::io::Result<TempPath> {
    let suffix = extension_of(name).unwrap_or_default();
    let mut file = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(&suffix)
        .tempfile_in(dir)?;
    file.write_all(data)?;
    file.flush()?;
    Ok(file.into_temp_path())
}
