use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// HTTP server configuration loaded from environment variables.
///
/// All fields have defaults suitable for running next to a local engine.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long post-shutdown cleanup may wait for background tasks.
    pub shutdown_timeout_secs: u64,
    /// Maximum request body size; submissions carry base64 images.
    pub max_body_bytes: usize,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                 |
    /// |-------------------------|-------------------------|
    /// | `HOST`                  | `0.0.0.0`               |
    /// | `PORT`                  | `3000`                  |
    /// | `CORS_ORIGINS`          | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`                    |
    /// | `MAX_BODY_BYTES`        | `67108864` (64 MiB)     |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            host,
            port: env_or("PORT", 3000),
            cors_origins,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 30),
            shutdown_timeout_secs: env_or("SHUTDOWN_TIMEOUT_SECS", 30),
            max_body_bytes: env_or("MAX_BODY_BYTES", 64 * 1024 * 1024),
        }
    }
}

/// Engine connection and job lifecycle settings.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Engine `host:port`; HTTP and WebSocket URLs are derived from it.
    pub engine_host: String,
    /// Directory the engine reads input images from.
    pub input_dir: PathBuf,
    /// Reconnect the event stream after it drops.
    pub ws_reconnect: bool,
    /// Jobs older than this are swept regardless of status.
    pub job_retention: Duration,
    /// How often the retention sweep runs.
    pub sweep_interval: Duration,
    /// Failed reconciliation attempts before a job is marked failed.
    pub reconcile_max_attempts: u32,
    /// Fallback reconcile tick; `None` relies on stream events alone.
    pub reconcile_interval: Option<Duration>,
}

impl RelayConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default           |
    /// |---------------------------|-------------------|
    /// | `ENGINE_HOST`             | `127.0.0.1:8188`  |
    /// | `ENGINE_INPUT_DIR`        | `./ComfyUI/input` |
    /// | `ENGINE_WS_RECONNECT`     | `true`            |
    /// | `JOB_RETENTION_SECS`      | `3600`            |
    /// | `SWEEP_INTERVAL_SECS`     | `300` (non-zero)  |
    /// | `RECONCILE_MAX_ATTEMPTS`  | `5`               |
    /// | `RECONCILE_INTERVAL_SECS` | `30` (0 disables) |
    pub fn from_env() -> Self {
        let engine_host =
            std::env::var("ENGINE_HOST").unwrap_or_else(|_| "127.0.0.1:8188".into());
        let input_dir = std::env::var("ENGINE_INPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./ComfyUI/input"));

        let reconcile_interval_secs: u64 = env_or("RECONCILE_INTERVAL_SECS", 30);

        Self {
            engine_host,
            input_dir,
            ws_reconnect: env_or("ENGINE_WS_RECONNECT", true),
            job_retention: Duration::from_secs(env_or("JOB_RETENTION_SECS", 3600)),
            sweep_interval: Duration::from_secs(env_nonzero("SWEEP_INTERVAL_SECS", 300)),
            reconcile_max_attempts: env_or("RECONCILE_MAX_ATTEMPTS", 5),
            reconcile_interval: (reconcile_interval_secs > 0)
                .then(|| Duration::from_secs(reconcile_interval_secs)),
        }
    }

    /// Base HTTP URL of the engine, e.g. `http://127.0.0.1:8188`.
    pub fn api_url(&self) -> String {
        format!("http://{}", self.engine_host)
    }

    /// Base WebSocket URL of the engine, e.g. `ws://127.0.0.1:8188`.
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.engine_host)
    }
}

/// Read and parse `key`, falling back to `default` when unset.
///
/// Panics on a malformed value; misconfiguration should fail at startup.
fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{key} has invalid value '{raw}': {e}")),
        Err(_) => default,
    }
}

/// Like [`env_or`], but a zero value is a startup error.
fn env_nonzero(key: &str, default: u64) -> u64 {
    let value = env_or(key, default);
    if value == 0 {
        panic!("{key} must be greater than zero");
    }
    value
}
