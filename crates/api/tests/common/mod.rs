#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use relay_comfyui::api::{ComfyUIApiError, EngineApi, SubmitResponse};
use relay_comfyui::history::ArtifactRef;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use relay_api::config::ServerConfig;
use relay_api::engine::relay::JobRelay;
use relay_api::router::build_app_router;
use relay_api::state::AppState;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        max_body_bytes: 16 * 1024 * 1024,
    }
}

// ---------------------------------------------------------------------------
// In-memory engine
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeState {
    next_id: u32,
    submissions: Vec<Value>,
    client_ids: Vec<String>,
    /// Input directory listing observed at each submission.
    staged_at_submit: Vec<Vec<String>>,
    histories: HashMap<String, Value>,
    artifacts: HashMap<String, Vec<u8>>,
    reject_with: Option<String>,
    fail_fetches: bool,
    history_calls: usize,
}

/// Engine double: assigns `prompt-N` ids, serves canned history documents
/// and artifact bytes keyed by filename.
pub struct FakeEngine {
    input_dir: PathBuf,
    state: Mutex<FakeState>,
}

impl FakeEngine {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn reject_with(&self, body: &str) {
        self.state.lock().unwrap().reject_with = Some(body.to_string());
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.state.lock().unwrap().fail_fetches = fail;
    }

    pub fn set_history(&self, prompt_id: &str, history: Value) {
        self.state
            .lock()
            .unwrap()
            .histories
            .insert(prompt_id.to_string(), history);
    }

    pub fn put_artifact(&self, filename: &str, bytes: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .artifacts
            .insert(filename.to_string(), bytes.to_vec());
    }

    pub fn submissions(&self) -> Vec<Value> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn client_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().client_ids.clone()
    }

    pub fn staged_at_submit(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().staged_at_submit.clone()
    }

    pub fn history_calls(&self) -> usize {
        self.state.lock().unwrap().history_calls
    }

    fn list_input_dir(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.input_dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

#[async_trait]
impl EngineApi for FakeEngine {
    async fn submit_workflow(
        &self,
        workflow: &Value,
        client_id: &str,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        let listing = self.list_input_dir();
        let mut state = self.state.lock().unwrap();

        if let Some(body) = state.reject_with.clone() {
            return Err(ComfyUIApiError::ApiError { status: 400, body });
        }

        state.next_id += 1;
        let number = state.next_id as i32;
        state.submissions.push(workflow.clone());
        state.client_ids.push(client_id.to_string());
        state.staged_at_submit.push(listing);

        Ok(SubmitResponse {
            prompt_id: format!("prompt-{number}"),
            number,
        })
    }

    async fn get_history(&self, prompt_id: &str) -> Result<Value, ComfyUIApiError> {
        let mut state = self.state.lock().unwrap();
        state.history_calls += 1;
        Ok(state
            .histories
            .get(prompt_id)
            .cloned()
            .unwrap_or_else(|| json!({})))
    }

    async fn fetch_artifact(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, ComfyUIApiError> {
        let state = self.state.lock().unwrap();
        if state.fail_fetches {
            return Err(ComfyUIApiError::ApiError {
                status: 500,
                body: "view failed".to_string(),
            });
        }
        state
            .artifacts
            .get(&artifact.filename)
            .cloned()
            .ok_or_else(|| ComfyUIApiError::ApiError {
                status: 404,
                body: format!("{} not found", artifact.filename),
            })
    }
}

/// A finished history document whose single output node lists `filenames`
/// in order.
pub fn completed_history(prompt_id: &str, filenames: &[&str]) -> Value {
    let images: Vec<Value> = filenames
        .iter()
        .map(|f| json!({"filename": f, "subfolder": "", "type": "output"}))
        .collect();
    json!({
        prompt_id: {
            "status": {"status_str": "success", "completed": true, "messages": []},
            "outputs": {"9": {"images": images}},
        }
    })
}

/// A history document reporting an execution error.
pub fn failed_history(prompt_id: &str, message: &str) -> Value {
    json!({
        prompt_id: {
            "status": {
                "status_str": "error",
                "completed": false,
                "messages": [["execution_error", {"exception_message": message}]],
            },
            "outputs": {},
        }
    })
}

// ---------------------------------------------------------------------------
// App construction
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub router: Router,
    pub relay: Arc<JobRelay>,
    pub engine: Arc<FakeEngine>,
    /// Engine input directory; lives as long as the app.
    pub input_dir: TempDir,
}

impl TestApp {
    pub fn input_path(&self) -> PathBuf {
        self.input_dir.path().join("input")
    }
}

/// Build the full application router over a [`FakeEngine`], with a
/// reconcile budget of `max_attempts`.
///
/// Uses the same [`build_app_router`] as `main.rs`, so tests exercise the
/// production middleware stack.
pub fn build_test_app_with(max_attempts: u32) -> TestApp {
    let input_dir = tempfile::tempdir().unwrap();
    let input_path = input_dir.path().join("input");
    let engine = Arc::new(FakeEngine::new(&input_path));

    let relay = Arc::new(JobRelay::new(
        Arc::clone(&engine) as Arc<dyn EngineApi>,
        input_path,
        "test-client",
        max_attempts,
    ));

    let config = test_config();
    let state = AppState {
        config: Arc::new(config.clone()),
        relay: Arc::clone(&relay),
    };

    TestApp {
        router: build_app_router(state, &config),
        relay,
        engine,
        input_dir,
    }
}

pub fn build_test_app() -> TestApp {
    build_test_app_with(3)
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
