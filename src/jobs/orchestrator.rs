//! Batch orchestration.
//!
//! [`JobOrchestrator::submit`] registers a job and returns at once. The
//! batch then runs on its own tokio task:
//!
//! ```text
//! submit ──▶ store.insert(Processing) ──▶ spawn ──▶ [permit] ──▶ file 1 … file N ──▶ store.finish
//! ```
//!
//! Files are processed sequentially in submission order, each inside
//! `spawn_blocking`. A failing file is recorded and the batch moves on. Each
//! staged file is deleted as soon as its turn is over. Results accumulate
//! locally and reach the store in a single `finish` call, so pollers see
//! either `Processing` or the complete outcome.
//!
//! A semaphore caps how many batches do CPU work at once.

use super::store::{FinishOutcome, JobStore};
use crate::config::ServiceConfig;
use crate::error::FileError;
use crate::output::{Job, JobId, JobOutcome, JobStatus, PageResult};
use crate::pipeline::sniff::{self, SourceKind, UNKNOWN_MIME};
use crate::pipeline::DocumentPipeline;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempPath;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// An uploaded file staged on disk. The file is deleted when the value is
/// dropped.
#[derive(Debug)]
pub struct StagedFile {
    /// Name the file was uploaded with.
    pub name: String,
    pub path: TempPath,
}

impl StagedFile {
    pub fn new(name: impl Into<String>, path: TempPath) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }
}

pub struct JobOrchestrator {
    store: Arc<JobStore>,
    pipeline: Arc<DocumentPipeline>,
    config: Arc<ServiceConfig>,
    permits: Arc<Semaphore>,
}

impl JobOrchestrator {
    pub fn new(config: Arc<ServiceConfig>, pipeline: Arc<DocumentPipeline>) -> Self {
        Self {
            store: Arc::new(JobStore::new(
                config.max_resident_jobs,
                config.eviction_batch_size,
            )),
            pipeline,
            permits: Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1))),
            config,
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn pipeline(&self) -> &Arc<DocumentPipeline> {
        &self.pipeline
    }

    /// Register a batch and schedule its processing. Must be called from
    /// within a tokio runtime.
    pub fn submit(&self, files: Vec<StagedFile>) -> JobId {
        let id = JobId::new();
        let evicted = self.store.insert(Job::new(id, files.len()));
        if !evicted.is_empty() {
            warn!(job_id = %id, "store full, evicted {} oldest jobs", evicted.len());
        }
        info!(job_id = %id, "Started OCR job with {} files", files.len());

        let store = Arc::clone(&self.store);
        let batch = BatchContext {
            id,
            pipeline: Arc::clone(&self.pipeline),
            config: Arc::clone(&self.config),
            permits: Arc::clone(&self.permits),
        };

        tokio::spawn(async move {
            // The inner task isolates panics so the job still reaches a
            // terminal state.
            let outcome = match tokio::spawn(batch.run(files)).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(job_id = %id, "OCR job aborted: {}", e);
                    critical(id, &e.to_string())
                }
            };
            let status = outcome.status;
            match store.finish(&id, outcome) {
                FinishOutcome::Applied => {
                    info!(job_id = %id, "OCR job finished: {}", status.as_str())
                }
                FinishOutcome::Missing => {
                    info!(job_id = %id, "OCR job was removed before it finished")
                }
                FinishOutcome::AlreadyTerminal => {
                    warn!(job_id = %id, "OCR job already terminal; outcome dropped")
                }
            }
        });

        id
    }

    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.store.get(id)
    }

    /// Remove a job. Its background work, if any, keeps running and its
    /// final write becomes a no-op.
    pub fn delete(&self, id: &JobId) -> bool {
        let removed = self.store.remove(id);
        if removed {
            info!(job_id = %id, "Deleted OCR job");
        }
        removed
    }
}

struct BatchContext {
    id: JobId,
    pipeline: Arc<DocumentPipeline>,
    config: Arc<ServiceConfig>,
    permits: Arc<Semaphore>,
}

impl BatchContext {
    async fn run(self, files: Vec<StagedFile>) -> JobOutcome {
        let _permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => return critical(self.id, &e.to_string()),
        };

        let mut results = Vec::new();
        let mut errors = Vec::new();
        for file in files {
            let StagedFile { name, path } = file;
            match self.process_file(&name, &path).await {
                Ok(pages) => results.extend(pages),
                Err(e) => {
                    error!(job_id = %self.id, file = %name, "{}", e);
                    errors.push(e);
                }
            }
            if let Err(e) = path.close() {
                warn!(job_id = %self.id, file = %name, "could not remove staged file: {}", e);
            }
        }

        summarize(results, &errors)
    }

    async fn process_file(&self, name: &str, path: &Path) -> Result<Vec<PageResult>, FileError> {
        info!(job_id = %self.id, file = %name, "Processing file");

        let pipeline = Arc::clone(&self.pipeline);
        let config = Arc::clone(&self.config);
        let owned_name = name.to_string();
        let owned_path = path.to_path_buf();

        let work = tokio::task::spawn_blocking(move || {
            let mime = sniff::classify(&owned_path);
            if mime != UNKNOWN_MIME && !config.is_supported_mime(&mime) {
                return Err(FileError::UnsupportedType {
                    file: owned_name,
                    mime,
                });
            }
            let kind = SourceKind::resolve(&mime, &owned_name);
            pipeline
                .process(&owned_path, &owned_name, kind)
                .map_err(|e| FileError::Processing {
                    file: owned_name.clone(),
                    detail: e.to_string(),
                })
        })
        .await;

        work.unwrap_or_else(|e| {
            Err(FileError::Processing {
                file: name.to_string(),
                detail: e.to_string(),
            })
        })
    }
}

/// Fold per-file results into the job's terminal state.
pub fn summarize(results: Vec<PageResult>, errors: &[FileError]) -> JobOutcome {
    let joined = || {
        errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    };

    if results.is_empty() {
        JobOutcome {
            status: JobStatus::Failed,
            results,
            error_message: Some(format!(
                "No files processed successfully. Errors: {}",
                joined()
            )),
        }
    } else {
        JobOutcome {
            status: JobStatus::Completed,
            results,
            error_message: (!errors.is_empty())
                .then(|| format!("Completed with errors: {}", joined())),
        }
    }
}

fn critical(id: JobId, detail: &str) -> JobOutcome {
    JobOutcome {
        status: JobStatus::Failed,
        results: Vec::new(),
        error_message: Some(format!("Critical error in OCR job {}: {}", id, detail)),
    }
}
