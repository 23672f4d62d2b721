//! HTTP error mapping.

use crate::error::ValidationError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Everything a handler can answer with besides success.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Malformed upload: {0}")]
    MalformedUpload(String),

    #[error("Job not found")]
    JobNotFound,

    #[error("Service unhealthy")]
    Unhealthy,

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::MalformedUpload(_) => StatusCode::BAD_REQUEST,
            ApiError::JobNotFound => StatusCode::NOT_FOUND,
            ApiError::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(ValidationError::NoFiles) => "NO_FILES",
            ApiError::Validation(ValidationError::TooManyFiles { .. }) => "TOO_MANY_FILES",
            ApiError::Validation(ValidationError::InvalidFile { .. }) => "INVALID_FILE",
            ApiError::MalformedUpload(_) => "MALFORMED_UPLOAD",
            ApiError::JobNotFound => "JOB_NOT_FOUND",
            ApiError::Unhealthy => "SERVICE_UNHEALTHY",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }
        let body = Json(ErrorResponse {
            detail: self.to_string(),
            code: self.code(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            ApiError::from(ValidationError::NoFiles).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::JobNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Unhealthy.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn validation_message_passes_through() {
        let e = ApiError::from(ValidationError::NoFiles);
        assert_eq!(e.to_string(), "No files provided");
        assert_eq!(e.code(), "NO_FILES");
    }
}
