//! Shared helpers for the gateway integration tests.
//!
//! Tests run against the in-memory collaborators from `tripsync-db`,
//! which implement the same contracts as the Postgres adapters.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::extract::ws::Message;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tokio::sync::mpsc::UnboundedReceiver;
use tower::ServiceExt;

use tripsync_api::auth::IdentityResolver;
use tripsync_api::config::ServerConfig;
use tripsync_api::plan::PlanRouter;
use tripsync_api::rooms::RoomRegistry;
use tripsync_api::routes;
use tripsync_api::state::AppState;
use tripsync_core::protocol::ServerMessage;
use tripsync_core::types::UserRef;
use tripsync_db::memory::MemoryStore;

/// Minimal config for tests (never actually bound to a socket).
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".into()],
        request_timeout_secs: 5,
    }
}

/// Build an `AppState` wired to a fresh in-memory store, returning the
/// store so tests can seed trips and invites.
pub fn build_test_state() -> (AppState, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(RoomRegistry::new());
    let resolver = Arc::new(IdentityResolver::new(store.clone(), store.clone()));
    let router = Arc::new(PlanRouter::new(store.clone(), Arc::clone(&registry)));

    let state = AppState {
        config: Arc::new(test_config()),
        registry,
        store: store.clone(),
        resolver,
        router,
    };
    (state, store)
}

/// Build the HTTP app for `oneshot` requests.
pub fn build_test_app() -> (Router, Arc<MemoryStore>) {
    let (state, store) = build_test_state();
    (routes::router().with_state(state), store)
}

/// Send a GET request to the app.
pub async fn get(app: Router, path: &str) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .uri(path)
            .body(Body::empty())
            .expect("request builds"),
    )
    .await
    .expect("request succeeds")
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body collects")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body is JSON")
}

/// A test identity.
pub fn user(email: &str) -> UserRef {
    UserRef {
        id: format!("user-{email}"),
        email: email.into(),
        fullname: email.split('@').next().unwrap_or("user").into(),
    }
}

/// Receive the next protocol frame from a session channel, skipping
/// transport frames (pings).
pub async fn recv_frame(rx: &mut UnboundedReceiver<Message>) -> ServerMessage {
    loop {
        let msg = rx.recv().await.expect("channel delivers a frame");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("frame is a server message");
        }
    }
}

/// Drain one frame without waiting; `None` when the channel is empty.
pub fn try_recv_frame(rx: &mut UnboundedReceiver<Message>) -> Option<ServerMessage> {
    while let Ok(msg) = rx.try_recv() {
        if let Message::Text(text) = msg {
            return Some(serde_json::from_str(text.as_str()).expect("frame is a server message"));
        }
    }
    None
}
