//! Wire protocol between a trip-room client and the sync gateway.
//!
//! Messages are JSON with an internally-tagged `"type"` discriminator so
//! clients can route frames by type string. The protocol is transport
//! independent; both sides happen to speak it over WebSocket text frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SyncError;
use crate::plan::{MutationEvent, PlanSection, PlanSnapshot};
use crate::types::{TripId, UserRef};

// ---------------------------------------------------------------------------
// Client -> server
// ---------------------------------------------------------------------------

/// The mutation operations a client may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationOp {
    Add,
    Update,
    Delete,
}

/// Frames sent by the client.
///
/// The first frame on a fresh connection must be `room.join`; anything
/// else is a protocol error and the connection is closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Request to join a trip room, with the claimed identity and an
    /// optional invite token for not-yet-tripmates.
    #[serde(rename = "room.join")]
    RoomJoin {
        trip_id: TripId,
        user: UserRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        invite_token: Option<String>,
    },

    /// Request to apply one mutation to the trip plan.
    #[serde(rename = "plan.mutate")]
    PlanMutate {
        /// Client-chosen correlation id, echoed back on `plan.error`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        section: PlanSection,
        op: MutationOp,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },

    /// Request a full snapshot (used after reconnect instead of delta
    /// replay).
    #[serde(rename = "sync.request")]
    SyncRequest,

    /// Leave the room without dropping the connection.
    #[serde(rename = "room.leave")]
    RoomLeave,
}

// ---------------------------------------------------------------------------
// Server -> client
// ---------------------------------------------------------------------------

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Join confirmation, with the authoritative plan state.
    #[serde(rename = "room.joined")]
    RoomJoined {
        trip_id: TripId,
        snapshot: PlanSnapshot,
    },

    /// Join rejection. The connection is closed right after this frame;
    /// the client should surface the reason as a blocking message.
    #[serde(rename = "room.denied")]
    RoomDenied { reason: String },

    /// Broadcast: an item was added. Delivered to every session in the
    /// room, including the sender (idempotent echo).
    #[serde(rename = "plan.added")]
    PlanAdded {
        section: PlanSection,
        item: crate::plan::PlanItem,
        added_by: UserRef,
    },

    /// Broadcast: an item was updated.
    #[serde(rename = "plan.updated")]
    PlanUpdated {
        section: PlanSection,
        item: crate::plan::PlanItem,
        updated_by: UserRef,
    },

    /// Broadcast: an item was deleted.
    #[serde(rename = "plan.deleted")]
    PlanDeleted {
        section: PlanSection,
        item_id: String,
        deleted_by: UserRef,
    },

    /// Broadcast: the budget scalar was replaced.
    #[serde(rename = "budget.set")]
    BudgetSet { amount: f64, set_by: UserRef },

    /// Scoped error, delivered only to the requesting session.
    #[serde(rename = "plan.error")]
    PlanError {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        code: String,
        message: String,
        retryable: bool,
    },

    /// Full snapshot in response to `sync.request`.
    #[serde(rename = "sync.snapshot")]
    SyncSnapshot { snapshot: PlanSnapshot },
}

impl ServerMessage {
    /// Wrap a durably-applied mutation for broadcast.
    pub fn from_event(event: MutationEvent) -> Self {
        match event {
            MutationEvent::Added {
                section,
                item,
                added_by,
            } => ServerMessage::PlanAdded {
                section,
                item,
                added_by,
            },
            MutationEvent::Updated {
                section,
                item,
                updated_by,
            } => ServerMessage::PlanUpdated {
                section,
                item,
                updated_by,
            },
            MutationEvent::Deleted {
                section,
                item_id,
                deleted_by,
            } => ServerMessage::PlanDeleted {
                section,
                item_id,
                deleted_by,
            },
            MutationEvent::BudgetSet { amount, set_by } => {
                ServerMessage::BudgetSet { amount, set_by }
            }
        }
    }

    /// The inverse of [`from_event`](Self::from_event): recover the
    /// mutation from a broadcast frame, or `None` for non-broadcast
    /// frames.
    pub fn into_event(self) -> Option<MutationEvent> {
        match self {
            ServerMessage::PlanAdded {
                section,
                item,
                added_by,
            } => Some(MutationEvent::Added {
                section,
                item,
                added_by,
            }),
            ServerMessage::PlanUpdated {
                section,
                item,
                updated_by,
            } => Some(MutationEvent::Updated {
                section,
                item,
                updated_by,
            }),
            ServerMessage::PlanDeleted {
                section,
                item_id,
                deleted_by,
            } => Some(MutationEvent::Deleted {
                section,
                item_id,
                deleted_by,
            }),
            ServerMessage::BudgetSet { amount, set_by } => {
                Some(MutationEvent::BudgetSet { amount, set_by })
            }
            _ => None,
        }
    }

    /// Build a requester-scoped error frame.
    pub fn from_error(error: &SyncError, request_id: Option<String>) -> Self {
        ServerMessage::PlanError {
            request_id,
            code: error.code().to_string(),
            message: error.message().to_string(),
            retryable: error.is_retryable(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanItem;
    use serde_json::json;

    fn user() -> UserRef {
        UserRef {
            id: "u1".into(),
            email: "ada@example.com".into(),
            fullname: "Ada".into(),
        }
    }

    fn note(id: &str) -> PlanItem {
        PlanItem::new(
            id.into(),
            PlanSection::Notes,
            json!({"text": "bring sunscreen"}),
            user(),
        )
    }

    #[test]
    fn room_join_serialization() {
        let msg = ClientMessage::RoomJoin {
            trip_id: "t1".into(),
            user: user(),
            invite_token: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"room.join"#));
        assert!(!json.contains("invite_token"));

        let back: ClientMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn plan_mutate_defaults_optional_fields() {
        let raw = r#"{"type":"plan.mutate","section":"notes","op":"add","payload":{"text":"x"}}"#;
        let msg: ClientMessage = serde_json::from_str(raw).unwrap();
        match msg {
            ClientMessage::PlanMutate {
                request_id,
                section,
                op,
                id,
                payload,
            } => {
                assert!(request_id.is_none());
                assert_eq!(section, PlanSection::Notes);
                assert_eq!(op, MutationOp::Add);
                assert!(id.is_none());
                assert_eq!(payload, Some(json!({"text": "x"})));
            }
            other => panic!("Expected PlanMutate, got: {other:?}"),
        }
    }

    #[test]
    fn unit_variants_round_trip() {
        let json = serde_json::to_string(&ClientMessage::SyncRequest).unwrap();
        assert!(json.contains(r#""type":"sync.request"#));
        let back: ClientMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ClientMessage::SyncRequest);
    }

    #[test]
    fn broadcast_frames_round_trip_through_events() {
        let events = vec![
            MutationEvent::Added {
                section: PlanSection::Notes,
                item: note("n1"),
                added_by: user(),
            },
            MutationEvent::Deleted {
                section: PlanSection::Notes,
                item_id: "n1".into(),
                deleted_by: user(),
            },
            MutationEvent::BudgetSet {
                amount: 700.0,
                set_by: user(),
            },
        ];
        for event in events {
            let msg = ServerMessage::from_event(event.clone());
            assert_eq!(msg.into_event(), Some(event));
        }
    }

    #[test]
    fn non_broadcast_frames_have_no_event() {
        let msg = ServerMessage::RoomDenied {
            reason: "trip not found".into(),
        };
        assert!(msg.into_event().is_none());
    }

    #[test]
    fn error_frame_carries_code_and_retryable() {
        let err = SyncError::Persistence("store timeout".into());
        let msg = ServerMessage::from_error(&err, Some("req-1".into()));
        match msg {
            ServerMessage::PlanError {
                request_id,
                code,
                message,
                retryable,
            } => {
                assert_eq!(request_id.as_deref(), Some("req-1"));
                assert_eq!(code, "persistence");
                assert_eq!(message, "store timeout");
                assert!(retryable);
            }
            other => panic!("Expected PlanError, got: {other:?}"),
        }
    }

    #[test]
    fn deleted_frame_wire_shape() {
        let msg = ServerMessage::PlanDeleted {
            section: PlanSection::Notes,
            item_id: "n1".into(),
            deleted_by: user(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"plan.deleted"#));
        assert!(json.contains(r#""item_id":"n1"#));
    }
}
