//! Handlers for job submission and status polling.
//!
//! Request and response shapes follow the serverless-worker convention
//! callers already use: `{ "input": { "workflow": ..., "images": [...] } }`
//! in, `{ "id", "status" }` out.

use axum::extract::{Path, State};
use axum::Json;
use relay_core::job::{Job, JobStatus};
use serde::{Deserialize, Serialize};

use crate::engine::stager::InputImage;
use crate::error::AppResult;
use crate::state::AppState;

/// Body of `POST /run`.
#[derive(Debug, Default, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub input: Option<SubmitInput>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubmitInput {
    /// Engine workflow, forwarded verbatim.
    #[serde(default)]
    pub workflow: Option<serde_json::Value>,
    /// Images to stage before submission.
    #[serde(default)]
    pub images: Option<Vec<InputImage>>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub id: String,
    pub status: JobStatus,
}

/// Body of `GET /status/{id}`.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub id: String,
    pub status: JobStatus,
    /// `null` until the job completes.
    pub output: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            status: job.status,
            output: job.output,
            error: job.error,
        }
    }
}

/// POST /run
///
/// Stages any embedded images, forwards the workflow to the engine, and
/// returns the engine's prompt id immediately. Does not wait for the job.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(body): Json<SubmitRequest>,
) -> AppResult<Json<SubmitResponse>> {
    let input = body.input.unwrap_or_default();
    let images = input.images.unwrap_or_default();

    let job = state.relay.submit(input.workflow.as_ref(), &images).await?;

    Ok(Json(SubmitResponse {
        id: job.id,
        status: job.status,
    }))
}

/// GET /status/{id}
///
/// Point-in-time read of a tracked job; callers poll.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<JobStatusResponse>> {
    let job = state.relay.status(&id).await?;
    Ok(Json(job.into()))
}
