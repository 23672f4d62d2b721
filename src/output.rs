//! Result and job records.
//!
//! Field names serialise to the JSON contract the web client already
//! consumes (`filename`, `text`, `bbox_data`, `page_number`, …), which is why
//! several fields carry a `serde(rename)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Axis-aligned token box in pixel units of the normalised image.
///
/// Serialised as `[x, y, width, height]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl From<[i32; 4]> for BoundingBox {
    fn from([x, y, width, height]: [i32; 4]) -> Self {
        Self { x, y, width, height }
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x, b.y, b.width, b.height]
    }
}

/// One recognised word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    /// Engine confidence rescaled to `[0, 1]`.
    pub confidence: f32,
    #[serde(rename = "bbox")]
    pub bounding_box: BoundingBox,
}

/// Recognition output for one image or one page of a multi-page source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    /// Original upload name; `"{name} (Page {n})"` for multi-page sources.
    #[serde(rename = "filename")]
    pub source_name: String,

    #[serde(rename = "text")]
    pub full_text: String,

    /// Length-weighted page confidence in `[0, 1]`.
    pub confidence: f32,

    pub language: String,

    #[serde(rename = "bbox_data")]
    pub tokens: Vec<Token>,

    /// 1-based page number, only for multi-page sources.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub page_number: Option<usize>,
}

/// Opaque job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Job lifecycle. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Processing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

/// A submitted batch and, once terminal, its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "job_id")]
    pub id: JobId,
    pub status: JobStatus,
    #[serde(rename = "files_count")]
    pub file_count: usize,
    pub results: Vec<PageResult>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// A freshly submitted job: `Processing`, no results, no error.
    pub fn new(id: JobId, file_count: usize) -> Self {
        Self {
            id,
            status: JobStatus::Processing,
            file_count,
            results: Vec::new(),
            error_message: None,
            created_at: Utc::now(),
        }
    }
}

/// Terminal state written onto a job exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub status: JobStatus,
    pub results: Vec<PageResult>,
    pub error_message: Option<String>,
}
