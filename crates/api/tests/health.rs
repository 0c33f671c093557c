//! Integration tests for the HTTP surface outside the WebSocket
//! upgrade: the health endpoint and 404 handling.

mod common;

use axum::http::StatusCode;
use common::{body_json, build_test_app, get};

// ---------------------------------------------------------------------------
// Test: GET /health returns service status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let (app, _store) = build_test_app();

    let response = get(app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["rooms"], 0);
    assert_eq!(body["sessions"], 0);
}

// ---------------------------------------------------------------------------
// Test: unknown routes are 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_route_is_not_found() {
    let (app, _store) = build_test_app();

    let response = get(app, "/nope").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
