pub mod health;

use axum::routing::any;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the full route tree: health at the root, WebSocket sync at `/ws`.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .route("/ws", any(ws::ws_handler))
}
