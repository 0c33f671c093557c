use std::sync::Arc;

use tripsync_db::PlanStore;

use crate::auth::IdentityResolver;
use crate::config::ServerConfig;
use crate::plan::PlanRouter;
use crate::rooms::RoomRegistry;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`). The room
/// registry is the one legitimately process-wide piece of state: one
/// registry per server, created at startup, torn down at shutdown.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Trip rooms and their live sessions.
    pub registry: Arc<RoomRegistry>,
    /// Durable plan state (external collaborator).
    pub store: Arc<dyn PlanStore>,
    /// Join authorization.
    pub resolver: Arc<IdentityResolver>,
    /// Mutation validation, persistence, and fan-out.
    pub router: Arc<PlanRouter>,
}
