//! WebSocket infrastructure for trip-room sessions.
//!
//! Provides the HTTP upgrade handler, the per-connection session loop,
//! and heartbeat monitoring.

mod handler;
mod heartbeat;

pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
