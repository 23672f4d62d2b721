//! Bounded in-memory job store.
//!
//! The store owns its lock; callers only see atomic operations and cloned
//! snapshots. Residency is capped at `capacity`. Inserting into a full
//! store evicts the oldest jobs by creation order, at least enough to make
//! room and up to `eviction_batch` at once.
//!
//! Eviction is best-effort and unconditional: a job still `Processing` can
//! be dropped. Its background task then finds the record missing when it
//! tries to finish, which is a no-op.

use crate::output::{Job, JobId, JobOutcome};
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

/// What happened to a [`JobStore::finish`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishOutcome {
    Applied,
    /// The job was deleted or evicted first.
    Missing,
    /// The job already reached a terminal state; nothing was changed.
    AlreadyTerminal,
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobId, Job>,
    /// Creation order, oldest first.
    order: VecDeque<JobId>,
}

pub struct JobStore {
    inner: RwLock<Inner>,
    capacity: usize,
    eviction_batch: usize,
}

impl JobStore {
    pub fn new(capacity: usize, eviction_batch: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            capacity: capacity.max(1),
            eviction_batch: eviction_batch.max(1),
        }
    }

    /// Register `job`, evicting the oldest residents if the store is full.
    /// Returns the ids that were evicted.
    pub fn insert(&self, job: Job) -> Vec<JobId> {
        let mut inner = self.inner.write();
        let mut evicted = Vec::new();

        // Re-inserting an id replaces it in place rather than growing the store.
        if inner.jobs.contains_key(&job.id) {
            inner.order.retain(|id| *id != job.id);
        } else if inner.jobs.len() >= self.capacity {
            let needed = inner.jobs.len() + 1 - self.capacity;
            let victims = needed.max(self.eviction_batch.min(inner.jobs.len()));
            for _ in 0..victims {
                let Some(old) = inner.order.pop_front() else {
                    break;
                };
                inner.jobs.remove(&old);
                evicted.push(old);
            }
            info!(
                "Evicted {} old jobs ({} resident)",
                evicted.len(),
                inner.jobs.len()
            );
        }

        inner.order.push_back(job.id);
        inner.jobs.insert(job.id, job);
        evicted
    }

    /// Snapshot of a job.
    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.inner.read().jobs.get(id).cloned()
    }

    /// Move a `Processing` job to its terminal state. Happens at most once
    /// per job.
    pub fn finish(&self, id: &JobId, outcome: JobOutcome) -> FinishOutcome {
        let mut inner = self.inner.write();
        let Some(job) = inner.jobs.get_mut(id) else {
            debug!(job_id = %id, "finish on missing job ignored");
            return FinishOutcome::Missing;
        };
        if job.status.is_terminal() {
            return FinishOutcome::AlreadyTerminal;
        }
        job.status = outcome.status;
        job.results = outcome.results;
        job.error_message = outcome.error_message;
        FinishOutcome::Applied
    }

    /// Delete a job. Returns whether it existed.
    pub fn remove(&self, id: &JobId) -> bool {
        let mut inner = self.inner.write();
        if inner.jobs.remove(id).is_some() {
            inner.order.retain(|other| other != id);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
