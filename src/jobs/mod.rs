//! Job lifecycle: a bounded store and the orchestrator that drives batches
//! through the pipeline.

pub mod orchestrator;
pub mod store;

pub use orchestrator::{summarize, JobOrchestrator, StagedFile};
pub use store::{FinishOutcome, JobStore};
