use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::Message;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use tripsync_core::protocol::ServerMessage;

/// Identifies one live session within the registry.
pub type SessionId = Uuid;

/// Channel sender half for pushing frames to a session's connection.
type FrameSender = mpsc::UnboundedSender<Message>;

/// The live sessions for one trip, keyed by session id.
#[derive(Default)]
struct Room {
    members: HashMap<SessionId, FrameSender>,
}

/// Maps trip ids to their rooms.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc`
/// and shared across all connection tasks. This is the only state
/// shared between connections.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Room>>,
}

impl RoomRegistry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Add a session to a trip's room, creating the room if absent.
    ///
    /// Returns the receiver half of the frame channel so the caller can
    /// forward frames to the WebSocket sink.
    pub async fn join(
        &self,
        trip_id: &str,
        session_id: SessionId,
    ) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(trip_id.to_string()).or_default();
        room.members.insert(session_id, tx);
        tracing::debug!(trip_id, %session_id, members = room.members.len(), "Session joined room");
        rx
    }

    /// Remove a session from a trip's room, dropping the room when it
    /// becomes empty. Unknown sessions and trips are a no-op.
    ///
    /// Once removed, the session's channel is closed and it can never
    /// receive a later broadcast.
    pub async fn leave(&self, trip_id: &str, session_id: SessionId) {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get_mut(trip_id) {
            room.members.remove(&session_id);
            if room.members.is_empty() {
                rooms.remove(trip_id);
                tracing::debug!(trip_id, "Room disposed (last session left)");
            }
        }
    }

    /// Deliver a message to every session currently in the trip's room,
    /// including the originating session (idempotent echo).
    ///
    /// Holds the write lock for the duration of the fan-out so that
    /// broadcasts to one room are serialized: every member observes the
    /// same per-room FIFO order. Sessions whose channels are closed are
    /// silently skipped (they are cleaned up by their own receive loop).
    pub async fn broadcast(&self, trip_id: &str, message: &ServerMessage) {
        let Some(frame) = encode(message) else { return };

        let rooms = self.rooms.write().await;
        let Some(room) = rooms.get(trip_id) else {
            // Everyone left while the mutation was in flight; it is
            // durably applied, there is just nobody to tell.
            tracing::debug!(trip_id, "Broadcast to empty room dropped");
            return;
        };
        for sender in room.members.values() {
            let _ = sender.send(frame.clone());
        }
    }

    /// Deliver a message to a single session in a room (scoped errors,
    /// snapshot replies). Returns `false` if the session is gone.
    pub async fn send_to(
        &self,
        trip_id: &str,
        session_id: SessionId,
        message: &ServerMessage,
    ) -> bool {
        let Some(frame) = encode(message) else {
            return false;
        };
        let rooms = self.rooms.read().await;
        rooms
            .get(trip_id)
            .and_then(|room| room.members.get(&session_id))
            .map(|sender| sender.send(frame).is_ok())
            .unwrap_or(false)
    }

    /// Number of sessions in one room (0 if the room does not exist).
    pub async fn member_count(&self, trip_id: &str) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(trip_id).map(|r| r.members.len()).unwrap_or(0)
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Total sessions across all rooms.
    pub async fn session_count(&self) -> usize {
        let rooms = self.rooms.read().await;
        rooms.values().map(|r| r.members.len()).sum()
    }

    /// Send a Ping frame to every session in every room.
    ///
    /// Used by the heartbeat task to keep connections alive and detect
    /// stale ones.
    pub async fn ping_all(&self) {
        let rooms = self.rooms.read().await;
        for room in rooms.values() {
            for sender in room.members.values() {
                let _ = sender.send(Message::Ping(Bytes::new()));
            }
        }
    }

    /// Send a Close frame to every session, then clear all rooms.
    ///
    /// Used during graceful shutdown to notify all clients before the
    /// server stops.
    pub async fn shutdown_all(&self) {
        let mut rooms = self.rooms.write().await;
        let count: usize = rooms.values().map(|r| r.members.len()).sum();
        for room in rooms.values() {
            for sender in room.members.values() {
                let _ = sender.send(Message::Close(None));
            }
        }
        rooms.clear();
        tracing::info!(count, "Closed all trip-room sessions");
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialize a protocol message into a text frame.
fn encode(message: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode server message");
            None
        }
    }
}
