//! Integration tests for `POST /run` and `GET /status/{id}`.

mod common;

use axum::http::StatusCode;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use common::{body_json, get, post_json};
use serde_json::json;

fn workflow() -> serde_json::Value {
    json!({
        "3": {"class_type": "KSampler", "inputs": {"seed": 42}},
        "10": {"class_type": "LoadImage", "inputs": {"image": "face.png"}}
    })
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_returns_engine_id_in_queue() {
    let app = common::build_test_app();

    let response = post_json(
        app.router.clone(),
        "/run",
        json!({"input": {"workflow": workflow()}}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["id"], "prompt-1");
    assert_eq!(json["status"], "IN_QUEUE");

    // The workflow is forwarded verbatim with the relay's client id.
    assert_eq!(app.engine.submissions(), vec![workflow()]);
    assert_eq!(app.engine.client_ids(), vec!["test-client".to_string()]);

    let status = body_json(get(app.router, "/status/prompt-1").await).await;
    assert_eq!(status["id"], "prompt-1");
    assert_eq!(status["status"], "IN_QUEUE");
    assert!(status["output"].is_null());
    assert!(status.get("error").is_none());
}

#[tokio::test]
async fn submit_without_workflow_returns_400() {
    let app = common::build_test_app();

    let response = post_json(app.router, "/run", json!({"input": {"images": []}})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["error"], "workflow required in input.workflow");
    assert!(app.engine.submissions().is_empty());
}

#[tokio::test]
async fn submit_without_input_returns_400() {
    let app = common::build_test_app();

    let response = post_json(app.router, "/run", json!({})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["error"], "workflow required in input.workflow");
}

#[tokio::test]
async fn submit_with_null_workflow_returns_400() {
    let app = common::build_test_app();

    let response = post_json(app.router, "/run", json!({"input": {"workflow": null}})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.engine.submissions().is_empty());
}

#[tokio::test]
async fn large_image_payload_passes_default_limit_but_not_configured_one() {
    let app = common::build_test_app();
    let limit = common::test_config().max_body_bytes;

    // Larger than axum's 2 MiB default, well under the configured limit.
    let image = STANDARD.encode(vec![0u8; 3 * 1024 * 1024]);
    let response = post_json(
        app.router.clone(),
        "/run",
        json!({"input": {"workflow": workflow(), "images": [{"name": "big.png", "image": image}]}}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let oversized = "x".repeat(limit + 1);
    let response = post_json(
        app.router,
        "/run",
        json!({"input": {"workflow": {"note": oversized}}}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(app.engine.submissions().len(), 1);
}

// ---------------------------------------------------------------------------
// Input staging
// ---------------------------------------------------------------------------

#[tokio::test]
async fn images_are_staged_before_submission() {
    let app = common::build_test_app();
    let png = b"\x89PNG\r\n\x1a\nfake";

    let response = post_json(
        app.router.clone(),
        "/run",
        json!({"input": {
            "workflow": workflow(),
            "images": [
                {"name": "face.png", "image": STANDARD.encode(png)},
                {"name": "mask.png", "image": format!("data:image/png;base64,{}", STANDARD.encode(b"mask"))},
            ],
        }}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    // The engine saw both files already on disk when the workflow arrived.
    assert_eq!(
        app.engine.staged_at_submit(),
        vec![vec!["face.png".to_string(), "mask.png".to_string()]]
    );

    let written = std::fs::read(app.input_path().join("face.png")).unwrap();
    assert_eq!(written, png);
    let mask = std::fs::read(app.input_path().join("mask.png")).unwrap();
    assert_eq!(mask, b"mask");
}

#[tokio::test]
async fn invalid_base64_image_is_rejected_without_submission() {
    let app = common::build_test_app();

    let response = post_json(
        app.router.clone(),
        "/run",
        json!({"input": {
            "workflow": workflow(),
            "images": [{"name": "face.png", "image": "***not base64***"}],
        }}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.engine.submissions().is_empty());
    assert!(!app.input_path().join("face.png").exists());
}

#[tokio::test]
async fn path_traversal_image_name_is_rejected() {
    let app = common::build_test_app();

    let response = post_json(
        app.router.clone(),
        "/run",
        json!({"input": {
            "workflow": workflow(),
            "images": [{"name": "../escape.png", "image": STANDARD.encode(b"x")}],
        }}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert!(app.engine.submissions().is_empty());
    assert!(!app.input_dir.path().join("escape.png").exists());
}

// ---------------------------------------------------------------------------
// Engine rejection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn engine_rejection_returns_500_with_details() {
    let app = common::build_test_app();
    let engine_error = r#"{"error": {"type": "prompt_outputs_failed_validation"}}"#;
    app.engine.reject_with(engine_error);

    let response = post_json(
        app.router.clone(),
        "/run",
        json!({"input": {"workflow": workflow()}}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let json = body_json(response).await;
    assert_eq!(json["error"], "Engine rejected workflow");
    assert_eq!(json["details"], engine_error);

    // Nothing was tracked.
    let health = body_json(get(app.router, "/health").await).await;
    assert_eq!(health["queue"]["depth"], 0);
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_job_returns_404() {
    let app = common::build_test_app();

    let response = get(app.router, "/status/unknown-id").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let json = body_json(response).await;
    assert_eq!(json["error"], "Job not found");
}

#[tokio::test]
async fn completed_job_status_carries_output() {
    let app = common::build_test_app();
    app.engine.put_artifact("a.png", b"first");
    app.engine.put_artifact("b.png", b"second");
    app.engine
        .set_history("prompt-1", common::completed_history("prompt-1", &["a.png", "b.png"]));

    post_json(
        app.router.clone(),
        "/run",
        json!({"input": {"workflow": workflow()}}),
    )
    .await;
    app.relay.materializer().reconcile("prompt-1").await;

    let json = body_json(get(app.router, "/status/prompt-1").await).await;
    assert_eq!(json["status"], "COMPLETED");
    assert_eq!(
        json["output"],
        json!([STANDARD.encode(b"first"), STANDARD.encode(b"second")])
    );
}
