//! HTTP surface.
//!
//! | Method | Path | Answer |
//! |--------|------|--------|
//! | POST   | `/api/ocr/upload` | `{job_id, status, files_count}` or 400 |
//! | GET    | `/api/ocr/result/:job_id` | job snapshot or 404 |
//! | DELETE | `/api/ocr/job/:job_id` | `{message}` or 404 |
//! | GET    | `/api/health` | engine version or 503 |
//! | GET    | `/api/supported-formats` | accepted types and limits |
//!
//! Handlers never touch the job map directly; everything goes through the
//! [`JobOrchestrator`].

pub mod error;
pub mod handlers;

use crate::config::ServiceConfig;
use crate::jobs::JobOrchestrator;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

pub use error::ApiError;

/// Multipart framing allowance on top of the file payloads.
const BODY_OVERHEAD: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<JobOrchestrator>,
    pub config: Arc<ServiceConfig>,
}

impl AppState {
    pub fn new(orchestrator: Arc<JobOrchestrator>, config: Arc<ServiceConfig>) -> Self {
        Self {
            orchestrator,
            config,
        }
    }
}

/// Build the service router with CORS and request tracing.
pub fn router(state: AppState) -> Router {
    let body_limit = state
        .config
        .max_file_size
        .saturating_mul(state.config.max_batch_size)
        .saturating_add(BODY_OVERHEAD);

    Router::new()
        .route("/api/ocr/upload", post(handlers::upload))
        .route("/api/ocr/result/:job_id", get(handlers::result))
        .route("/api/ocr/job/:job_id", delete(handlers::delete_job))
        .route("/api/health", get(handlers::health))
        .route("/api/supported-formats", get(handlers::supported_formats))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &ServiceConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
}
