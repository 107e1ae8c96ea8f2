//! Route definitions for job submission and polling.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Job routes, mounted at the root.
///
/// ```text
/// POST   /run             -> submit_job
/// GET    /status/{id}     -> get_job_status
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/run", post(jobs::submit_job))
        .route("/status/{id}", get(jobs::get_job_status))
}
