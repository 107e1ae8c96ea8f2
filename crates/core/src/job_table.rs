//! In-memory job table.
//!
//! [`JobTable`] is the only shared mutable state in the relay. Every
//! mutation goes through its `RwLock`, so status changes from the event
//! consumer, reconciliation tasks, and HTTP handlers are serialized. Callers
//! only ever receive clones; no reference to a stored [`Job`] escapes.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::CoreError;
use crate::job::{Job, JobStatus};
use crate::types::{JobId, Timestamp};

/// Result of a status-changing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The change was applied.
    Applied,
    /// The change would move the job backwards or out of a terminal state.
    Rejected,
    /// No job with that id (events may race ahead of `create`).
    Missing,
}

/// Thread-safe map from job id to [`Job`].
///
/// Designed to be wrapped in `Arc` and shared across tasks.
#[derive(Default)]
pub struct JobTable {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new `Queued` job stamped with the current time.
    ///
    /// Fails with [`CoreError::Conflict`] if the id is already tracked.
    pub async fn create(&self, id: &str) -> Result<Job, CoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(id) {
            return Err(CoreError::Conflict(format!("Duplicate job id '{id}'")));
        }
        let job = Job::new(id, Utc::now());
        jobs.insert(id.to_string(), job.clone());
        Ok(job)
    }

    pub async fn get(&self, id: &str) -> Option<Job> {
        self.jobs.read().await.get(id).cloned()
    }

    /// Move a job to a non-terminal or terminal status without attaching
    /// output. Regressions are rejected.
    pub async fn transition(&self, id: &str, status: JobStatus) -> TransitionOutcome {
        self.update(id, status, |_| {}).await
    }

    /// Mark a job completed and attach its artifacts.
    ///
    /// Output is written exactly once; a job that is already terminal is
    /// left untouched.
    pub async fn complete(&self, id: &str, output: Vec<String>) -> TransitionOutcome {
        self.update(id, JobStatus::Completed, |job| job.output = Some(output))
            .await
    }

    /// Mark a job failed with a reason.
    pub async fn fail(&self, id: &str, error: impl Into<String>) -> TransitionOutcome {
        let error = error.into();
        self.update(id, JobStatus::Failed, |job| job.error = Some(error))
            .await
    }

    /// Count one failed reconciliation attempt for `id`.
    ///
    /// When the count reaches `max_attempts` the job is failed. Returns the
    /// updated count, or `None` if the job is unknown. Terminal jobs are not
    /// counted against.
    pub async fn record_reconcile_failure(&self, id: &str, max_attempts: u32) -> Option<u32> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(id)?;
        if job.status.is_terminal() {
            return Some(job.reconcile_failures);
        }

        job.reconcile_failures += 1;
        job.updated_at = Utc::now();
        if job.reconcile_failures >= max_attempts {
            job.status = JobStatus::Failed;
            job.error = Some(format!(
                "Reconciliation failed after {} attempts",
                job.reconcile_failures
            ));
        }
        Some(job.reconcile_failures)
    }

    /// Ids of all queued or running jobs.
    pub async fn active_ids(&self) -> Vec<JobId> {
        self.jobs
            .read()
            .await
            .values()
            .filter(|job| job.status.is_active())
            .map(|job| job.id.clone())
            .collect()
    }

    /// Number of queued or running jobs.
    pub async fn active_count(&self) -> usize {
        self.jobs
            .read()
            .await
            .values()
            .filter(|job| job.status.is_active())
            .count()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Remove every job created more than `retention` ago, whatever its
    /// status. Returns the number removed.
    pub async fn sweep(&self, retention: Duration) -> usize {
        let cutoff = chrono::Duration::from_std(retention)
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention));

        match cutoff {
            Some(cutoff) => self.sweep_older_than(cutoff).await,
            None => 0,
        }
    }

    /// Remove every job whose `created_at` is strictly before `cutoff`.
    pub async fn sweep_older_than(&self, cutoff: Timestamp) -> usize {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| job.created_at >= cutoff);
        before - jobs.len()
    }

    // ---- private helpers ----

    async fn update<F>(&self, id: &str, status: JobStatus, apply: F) -> TransitionOutcome
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(id) else {
            return TransitionOutcome::Missing;
        };
        if !job.status.can_transition_to(status) {
            return TransitionOutcome::Rejected;
        }

        job.status = status;
        job.updated_at = Utc::now();
        apply(job);
        TransitionOutcome::Applied
    }
}
