//! Output materialization.
//!
//! [`Materializer::reconcile`] asks the engine whether a job has finished
//! and, if so, downloads every artifact and completes the job with the
//! base64-encoded payloads. It is safe to call repeatedly: terminal jobs are
//! skipped, overlapping calls for the same job collapse to one, and a
//! not-yet-finished job is left alone.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures::future::try_join_all;
use relay_comfyui::api::EngineApi;
use relay_comfyui::history::{parse_history, HistoryState};
use relay_core::job_table::{JobTable, TransitionOutcome};
use relay_core::types::JobId;

/// What a single reconcile call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Unknown, already terminal, or already being reconciled.
    Skipped,
    /// The engine has not finished the job.
    Pending,
    /// Completed with this many artifacts.
    Completed(usize),
    /// The engine reported an execution error.
    Failed,
    /// History or artifact fetch failed; counted towards the retry budget.
    Error,
}

pub struct Materializer {
    engine: Arc<dyn EngineApi>,
    jobs: Arc<JobTable>,
    max_attempts: u32,
    in_flight: Mutex<HashSet<JobId>>,
}

impl Materializer {
    pub fn new(engine: Arc<dyn EngineApi>, jobs: Arc<JobTable>, max_attempts: u32) -> Self {
        Self {
            engine,
            jobs,
            max_attempts: max_attempts.max(1),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Check the engine's history for `job_id` and complete or fail it.
    pub async fn reconcile(&self, job_id: &str) -> ReconcileOutcome {
        match self.jobs.get(job_id).await {
            Some(job) if job.status.is_active() => {}
            _ => return ReconcileOutcome::Skipped,
        }

        let Some(_guard) = InFlight::acquire(&self.in_flight, job_id) else {
            tracing::trace!(prompt_id = %job_id, "Reconcile already in flight");
            return ReconcileOutcome::Skipped;
        };

        let history = match self.engine.get_history(job_id).await {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(prompt_id = %job_id, error = %e, "History query failed");
                return self.record_failure(job_id).await;
            }
        };

        match parse_history(job_id, &history) {
            HistoryState::Pending => ReconcileOutcome::Pending,
            HistoryState::Failed(reason) => {
                tracing::warn!(prompt_id = %job_id, reason = %reason, "Engine reported failure");
                self.jobs.fail(job_id, reason).await;
                ReconcileOutcome::Failed
            }
            HistoryState::Completed(artifacts) => {
                let fetched =
                    try_join_all(artifacts.iter().map(|a| self.engine.fetch_artifact(a))).await;
                let blobs = match fetched {
                    Ok(blobs) => blobs,
                    Err(e) => {
                        tracing::warn!(prompt_id = %job_id, error = %e, "Artifact fetch failed");
                        return self.record_failure(job_id).await;
                    }
                };

                let output: Vec<String> = blobs.iter().map(|b| STANDARD.encode(b)).collect();
                let count = output.len();
                match self.jobs.complete(job_id, output).await {
                    TransitionOutcome::Applied => {
                        tracing::info!(prompt_id = %job_id, artifacts = count, "Job completed");
                        ReconcileOutcome::Completed(count)
                    }
                    // Swept or failed while we were downloading.
                    TransitionOutcome::Rejected | TransitionOutcome::Missing => {
                        ReconcileOutcome::Skipped
                    }
                }
            }
        }
    }

    async fn record_failure(&self, job_id: &str) -> ReconcileOutcome {
        if let Some(attempts) = self
            .jobs
            .record_reconcile_failure(job_id, self.max_attempts)
            .await
        {
            if attempts >= self.max_attempts {
                tracing::error!(prompt_id = %job_id, attempts, "Giving up on job reconciliation");
            }
        }
        ReconcileOutcome::Error
    }
}

/// Marks a job as being reconciled for the guard's lifetime.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<JobId>>,
    id: JobId,
}

impl<'a> InFlight<'a> {
    fn acquire(set: &'a Mutex<HashSet<JobId>>, id: &str) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id.to_string());
        inserted.then(|| Self {
            set,
            id: id.to_string(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.id);
    }
}
