//! Unit tests for `RoomRegistry`.
//!
//! These exercise the fan-out layer directly, without any HTTP
//! upgrades: join/leave semantics, room disposal, broadcast delivery,
//! per-room ordering, and graceful shutdown.

mod common;

use axum::extract::ws::Message;
use common::{recv_frame, try_recv_frame};
use tripsync_api::rooms::RoomRegistry;
use tripsync_core::protocol::ServerMessage;
use uuid::Uuid;

fn denied(reason: &str) -> ServerMessage {
    ServerMessage::RoomDenied {
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Test: new registry is empty
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_registry_has_no_rooms() {
    let registry = RoomRegistry::new();

    assert_eq!(registry.room_count().await, 0);
    assert_eq!(registry.session_count().await, 0);
}

// ---------------------------------------------------------------------------
// Test: join creates the room lazily
// ---------------------------------------------------------------------------

#[tokio::test]
async fn join_creates_room_on_first_member() {
    let registry = RoomRegistry::new();

    let _rx = registry.join("trip-1", Uuid::new_v4()).await;

    assert_eq!(registry.room_count().await, 1);
    assert_eq!(registry.member_count("trip-1").await, 1);
}

// ---------------------------------------------------------------------------
// Test: last leave disposes the room
// ---------------------------------------------------------------------------

#[tokio::test]
async fn room_is_disposed_when_last_session_leaves() {
    let registry = RoomRegistry::new();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let _rx_a = registry.join("trip-1", a).await;
    let _rx_b = registry.join("trip-1", b).await;

    registry.leave("trip-1", a).await;
    assert_eq!(registry.room_count().await, 1);

    registry.leave("trip-1", b).await;
    assert_eq!(registry.room_count().await, 0);
}

// ---------------------------------------------------------------------------
// Test: leaving an unknown room or session is a no-op
// ---------------------------------------------------------------------------

#[tokio::test]
async fn leave_unknown_is_noop() {
    let registry = RoomRegistry::new();

    let _rx = registry.join("trip-1", Uuid::new_v4()).await;

    registry.leave("trip-1", Uuid::new_v4()).await;
    registry.leave("trip-2", Uuid::new_v4()).await;

    assert_eq!(registry.member_count("trip-1").await, 1);
}

// ---------------------------------------------------------------------------
// Test: broadcast reaches every member, including the sender's session
// ---------------------------------------------------------------------------

#[tokio::test]
async fn broadcast_reaches_all_members() {
    let registry = RoomRegistry::new();

    let mut rx_a = registry.join("trip-1", Uuid::new_v4()).await;
    let mut rx_b = registry.join("trip-1", Uuid::new_v4()).await;

    registry.broadcast("trip-1", &denied("test frame")).await;

    assert_eq!(recv_frame(&mut rx_a).await, denied("test frame"));
    assert_eq!(recv_frame(&mut rx_b).await, denied("test frame"));
}

// ---------------------------------------------------------------------------
// Test: broadcast does not cross rooms
// ---------------------------------------------------------------------------

#[tokio::test]
async fn broadcast_is_scoped_to_one_room() {
    let registry = RoomRegistry::new();

    let mut rx_a = registry.join("trip-1", Uuid::new_v4()).await;
    let mut rx_other = registry.join("trip-2", Uuid::new_v4()).await;

    registry.broadcast("trip-1", &denied("only trip-1")).await;

    assert_eq!(recv_frame(&mut rx_a).await, denied("only trip-1"));
    assert!(try_recv_frame(&mut rx_other).is_none());
}

// ---------------------------------------------------------------------------
// Test: a removed session never receives a subsequent broadcast
// ---------------------------------------------------------------------------

#[tokio::test]
async fn removed_session_receives_no_later_broadcasts() {
    let registry = RoomRegistry::new();
    let a = Uuid::new_v4();

    let mut rx_a = registry.join("trip-1", a).await;
    let _rx_b = registry.join("trip-1", Uuid::new_v4()).await;

    registry.leave("trip-1", a).await;
    registry.broadcast("trip-1", &denied("after leave")).await;

    // The member was dropped, so its channel is closed with nothing
    // buffered.
    assert!(try_recv_frame(&mut rx_a).is_none());
    assert!(rx_a.recv().await.is_none());
}

// ---------------------------------------------------------------------------
// Test: broadcast skips closed channels without panicking
// ---------------------------------------------------------------------------

#[tokio::test]
async fn broadcast_skips_closed_channels() {
    let registry = RoomRegistry::new();

    let rx_gone = registry.join("trip-1", Uuid::new_v4()).await;
    let mut rx_live = registry.join("trip-1", Uuid::new_v4()).await;

    drop(rx_gone);

    registry.broadcast("trip-1", &denied("still alive")).await;
    assert_eq!(recv_frame(&mut rx_live).await, denied("still alive"));
}

// ---------------------------------------------------------------------------
// Test: per-room FIFO -- every member sees broadcasts in the same order
// ---------------------------------------------------------------------------

#[tokio::test]
async fn members_observe_broadcasts_in_identical_order() {
    let registry = RoomRegistry::new();

    let mut rx_a = registry.join("trip-1", Uuid::new_v4()).await;
    let mut rx_b = registry.join("trip-1", Uuid::new_v4()).await;

    for i in 0..5 {
        registry.broadcast("trip-1", &denied(&format!("frame-{i}"))).await;
    }

    for i in 0..5 {
        assert_eq!(recv_frame(&mut rx_a).await, denied(&format!("frame-{i}")));
        assert_eq!(recv_frame(&mut rx_b).await, denied(&format!("frame-{i}")));
    }
}

// ---------------------------------------------------------------------------
// Test: send_to targets a single session
// ---------------------------------------------------------------------------

#[tokio::test]
async fn send_to_reaches_only_the_target_session() {
    let registry = RoomRegistry::new();
    let a = Uuid::new_v4();

    let mut rx_a = registry.join("trip-1", a).await;
    let mut rx_b = registry.join("trip-1", Uuid::new_v4()).await;

    assert!(registry.send_to("trip-1", a, &denied("just for ada")).await);

    assert_eq!(recv_frame(&mut rx_a).await, denied("just for ada"));
    assert!(try_recv_frame(&mut rx_b).is_none());
}

#[tokio::test]
async fn send_to_unknown_session_reports_failure() {
    let registry = RoomRegistry::new();

    assert!(!registry.send_to("trip-1", Uuid::new_v4(), &denied("nobody")).await);
}

// ---------------------------------------------------------------------------
// Test: shutdown_all sends Close and clears every room
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_all_sends_close_and_clears() {
    let registry = RoomRegistry::new();

    let mut rx_a = registry.join("trip-1", Uuid::new_v4()).await;
    let mut rx_b = registry.join("trip-2", Uuid::new_v4()).await;

    registry.shutdown_all().await;

    assert_eq!(registry.room_count().await, 0);
    assert_eq!(registry.session_count().await, 0);

    let msg_a = rx_a.recv().await.expect("rx_a should receive Close");
    assert!(matches!(msg_a, Message::Close(None)));
    let msg_b = rx_b.recv().await.expect("rx_b should receive Close");
    assert!(matches!(msg_b, Message::Close(None)));

    // After Close, the channels are closed for good.
    assert!(rx_a.recv().await.is_none());
}
