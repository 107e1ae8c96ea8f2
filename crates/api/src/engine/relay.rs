//! The job relay service.
//!
//! [`JobRelay`] is constructed once at startup and shared through
//! [`AppState`](crate::state::AppState). It owns the job table and the
//! engine client, and is the single entry point for both HTTP-driven
//! operations (submit, status, health) and stream-driven state changes
//! ([`JobRelay::apply_event`]).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use relay_comfyui::api::EngineApi;
use relay_comfyui::events::EngineEvent;
use relay_core::error::CoreError;
use relay_core::job::{Job, JobStatus};
use relay_core::job_table::{JobTable, TransitionOutcome};
use relay_core::types::JobId;

use crate::engine::materializer::{Materializer, ReconcileOutcome};
use crate::engine::stager::{InputImage, InputStager};
use crate::error::{AppError, AppResult};

/// Message returned when a submission has no workflow.
pub const WORKFLOW_REQUIRED: &str = "workflow required in input.workflow";

/// Point-in-time view for the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub stream_connected: bool,
    pub queue_depth: usize,
}

pub struct JobRelay {
    jobs: Arc<JobTable>,
    engine: Arc<dyn EngineApi>,
    stager: InputStager,
    materializer: Materializer,
    /// Identity sent with every submission and used by the event stream.
    client_id: String,
    stream_connected: AtomicBool,
}

impl JobRelay {
    pub fn new(
        engine: Arc<dyn EngineApi>,
        input_dir: impl Into<PathBuf>,
        client_id: impl Into<String>,
        reconcile_max_attempts: u32,
    ) -> Self {
        let jobs = Arc::new(JobTable::new());
        let materializer = Materializer::new(
            Arc::clone(&engine),
            Arc::clone(&jobs),
            reconcile_max_attempts,
        );

        Self {
            jobs,
            engine,
            stager: InputStager::new(input_dir),
            materializer,
            client_id: client_id.into(),
            stream_connected: AtomicBool::new(false),
        }
    }

    /// Shared handle to the job table (used by the retention sweep).
    pub fn jobs(&self) -> Arc<JobTable> {
        Arc::clone(&self.jobs)
    }

    pub fn materializer(&self) -> &Materializer {
        &self.materializer
    }

    /// Stage inputs, forward the workflow, and start tracking the job.
    ///
    /// Returns as soon as the engine has accepted the workflow; the job is
    /// `Queued` at that point.
    pub async fn submit(
        &self,
        workflow: Option<&serde_json::Value>,
        images: &[InputImage],
    ) -> AppResult<Job> {
        let workflow = workflow
            .filter(|w| !w.is_null())
            .ok_or_else(|| CoreError::Validation(WORKFLOW_REQUIRED.to_string()))?;

        if !images.is_empty() {
            let staged = self.stager.stage(images).await?;
            tracing::info!(count = staged.len(), "Staged input images");
        }

        let response = self
            .engine
            .submit_workflow(workflow, &self.client_id)
            .await
            .map_err(|e| AppError::EngineRejected {
                details: e.details(),
            })?;

        let job = self.jobs.create(&response.prompt_id).await?;
        tracing::info!(
            prompt_id = %job.id,
            queue_number = response.number,
            "Workflow submitted to engine",
        );
        Ok(job)
    }

    /// Current state of a tracked job.
    pub async fn status(&self, id: &str) -> AppResult<Job> {
        self.jobs.get(id).await.ok_or_else(|| {
            AppError::Core(CoreError::NotFound {
                entity: "Job",
                id: id.to_string(),
            })
        })
    }

    pub async fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            stream_connected: self.stream_connected.load(Ordering::SeqCst),
            queue_depth: self.jobs.active_count().await,
        }
    }

    /// Apply one stream event to job state.
    ///
    /// Events for unknown prompts are ignored. Reconciliation triggered by
    /// `QueueDrained` or `JobFinished` completes before this returns.
    pub async fn apply_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::StreamConnected => {
                self.stream_connected.store(true, Ordering::SeqCst);
                tracing::info!("Engine event stream connected");
            }
            EngineEvent::StreamDisconnected => {
                self.stream_connected.store(false, Ordering::SeqCst);
                tracing::warn!("Engine event stream disconnected");
            }
            EngineEvent::QueueDrained => {
                let outcomes = self.reconcile_active().await;
                tracing::debug!(checked = outcomes.len(), "Queue drained, reconciled active jobs");
            }
            EngineEvent::JobStarted { prompt_id } | EngineEvent::NodeExecuting { prompt_id, .. } => {
                self.mark_running(&prompt_id).await;
            }
            EngineEvent::JobFinished { prompt_id } => {
                self.materializer.reconcile(&prompt_id).await;
            }
            EngineEvent::JobFailed { prompt_id, error } => {
                if self.jobs.fail(&prompt_id, error.as_str()).await == TransitionOutcome::Applied {
                    tracing::warn!(prompt_id = %prompt_id, error = %error, "Job failed on engine");
                }
            }
            EngineEvent::Progress { prompt_id, percent } => {
                tracing::debug!(prompt_id = ?prompt_id, percent, "Generation progress");
            }
        }
    }

    /// Reconcile every queued or running job concurrently.
    pub async fn reconcile_active(&self) -> Vec<(JobId, ReconcileOutcome)> {
        let ids = self.jobs.active_ids().await;
        let outcomes = join_all(ids.iter().map(|id| self.materializer.reconcile(id))).await;
        ids.into_iter().zip(outcomes).collect()
    }

    async fn mark_running(&self, prompt_id: &str) {
        match self.jobs.transition(prompt_id, JobStatus::Running).await {
            TransitionOutcome::Applied => {
                tracing::debug!(prompt_id = %prompt_id, "Job running");
            }
            TransitionOutcome::Rejected => {}
            TransitionOutcome::Missing => {
                tracing::trace!(prompt_id = %prompt_id, "Event for untracked prompt");
            }
        }
    }
}
