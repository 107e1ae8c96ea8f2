//! Integration tests for the health endpoint and general HTTP behaviour.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::{body_json, get, post_json};
use relay_comfyui::events::EngineEvent;
use serde_json::json;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Test: GET /health reports stream state and queue depth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_check_returns_ok_with_json() {
    let app = common::build_test_app();
    let response = get(app.router, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["ws"], false);
    assert_eq!(json["queue"]["depth"], 0);
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn health_reflects_stream_connectivity() {
    let app = common::build_test_app();

    app.relay.apply_event(EngineEvent::StreamConnected).await;
    let json = body_json(get(app.router.clone(), "/health").await).await;
    assert_eq!(json["ws"], true);

    app.relay.apply_event(EngineEvent::StreamDisconnected).await;
    let json = body_json(get(app.router, "/health").await).await;
    assert_eq!(json["ws"], false);
}

#[tokio::test]
async fn health_queue_depth_counts_active_jobs_only() {
    let app = common::build_test_app();
    app.engine.set_history(
        "prompt-2",
        common::completed_history("prompt-2", &[]),
    );

    for _ in 0..2 {
        let response = post_json(
            app.router.clone(),
            "/run",
            json!({"input": {"workflow": {"3": {"class_type": "KSampler"}}}}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let json = body_json(get(app.router.clone(), "/health").await).await;
    assert_eq!(json["queue"]["depth"], 2);

    // prompt-2 finishes with no artifacts.
    app.relay
        .apply_event(EngineEvent::JobFinished {
            prompt_id: "prompt-2".into(),
        })
        .await;

    let json = body_json(get(app.router, "/health").await).await;
    assert_eq!(json["queue"]["depth"], 1);
}

// ---------------------------------------------------------------------------
// Test: Unknown route returns 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_route_returns_404() {
    let app = common::build_test_app();
    let response = get(app.router, "/this-route-does-not-exist").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Test: x-request-id header is present in response
// ---------------------------------------------------------------------------

#[tokio::test]
async fn response_contains_x_request_id_header() {
    let app = common::build_test_app();
    let response = get(app.router, "/health").await;

    let request_id = response
        .headers()
        .get("x-request-id")
        .expect("Response must contain an x-request-id header");
    assert_eq!(request_id.to_str().unwrap().len(), 36);
}

// ---------------------------------------------------------------------------
// Test: CORS preflight for the submit route
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cors_preflight_allows_post() {
    let app = common::build_test_app();

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/run")
        .header("Origin", "http://localhost:5173")
        .header("Access-Control-Request-Method", "POST")
        .header("Access-Control-Request-Headers", "content-type")
        .body(Body::empty())
        .unwrap();

    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers();
    assert_eq!(
        headers
            .get("access-control-allow-origin")
            .expect("Missing Access-Control-Allow-Origin header"),
        "http://localhost:5173"
    );
    let allow_methods = headers
        .get("access-control-allow-methods")
        .expect("Missing Access-Control-Allow-Methods header")
        .to_str()
        .unwrap();
    assert!(
        allow_methods.contains("POST"),
        "Allow-Methods should contain POST, got: {allow_methods}"
    );
}
