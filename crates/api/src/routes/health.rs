use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Always `"healthy"` while the process is serving.
    pub status: &'static str,
    /// Whether the engine event stream is currently open.
    pub ws: bool,
    pub queue: QueueHealth,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct QueueHealth {
    /// Jobs still queued or running.
    pub depth: usize,
}

/// GET /health -- reports stream connectivity and queue depth. Never fails.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.relay.health().await;

    Json(HealthResponse {
        status: "healthy",
        ws: snapshot.stream_connected,
        queue: QueueHealth {
            depth: snapshot.queue_depth,
        },
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
