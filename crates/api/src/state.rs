use std::sync::Arc;

use crate::config::ServerConfig;
use crate::engine::relay::JobRelay;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Job relay service (job table, engine client, event application).
    pub relay: Arc<JobRelay>,
}
