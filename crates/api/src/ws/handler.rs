use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use uuid::Uuid;

use tripsync_core::error::SyncError;
use tripsync_core::protocol::{ClientMessage, ServerMessage};
use tripsync_core::types::{TripId, UserRef};

use crate::state::AppState;

/// HTTP handler that upgrades the connection to WebSocket.
///
/// The session proper starts after the upgrade, with the join
/// handshake as its first step.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Outcome of reading the handshake frame.
enum Handshake {
    Join {
        trip_id: TripId,
        user: UserRef,
        invite_token: Option<String>,
    },
    /// Peer went away before sending anything useful.
    Gone,
}

/// Manage a single session after upgrade.
///
/// Protocol order is enforced here:
///   1. The first frame must be `room.join`; a denied handshake gets a
///      `room.denied` frame and the connection closes without ever
///      touching a room.
///   2. On success the session registers with the registry and receives
///      `room.joined` with a full snapshot.
///   3. Mutation requests are processed sequentially on this task (a
///      session is single-writer for its own connection).
///   4. Any disconnect path leaves the room before the task exits.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let session_id = Uuid::new_v4();
    tracing::info!(%session_id, "WebSocket connected");

    let (mut sink, mut stream) = socket.split();

    // --- Handshake ---
    let (trip_id, user, invite_token) = match read_join(&mut stream).await {
        Ok(Handshake::Join {
            trip_id,
            user,
            invite_token,
        }) => (trip_id, user, invite_token),
        Ok(Handshake::Gone) => {
            tracing::debug!(%session_id, "Connection closed before join");
            return;
        }
        Err(err) => {
            tracing::debug!(%session_id, error = %err, "Bad handshake");
            send_and_close(&mut sink, &ServerMessage::from_error(&err, None)).await;
            return;
        }
    };

    match state
        .resolver
        .authorize(&trip_id, &user, invite_token.as_deref())
        .await
    {
        Ok(()) => {}
        Err(SyncError::Unauthorized(reason)) => {
            tracing::info!(%session_id, %trip_id, email = %user.email, %reason, "Join denied");
            send_and_close(&mut sink, &ServerMessage::RoomDenied { reason }).await;
            return;
        }
        Err(err) => {
            tracing::warn!(%session_id, %trip_id, error = %err, "Authorization unavailable");
            send_and_close(&mut sink, &ServerMessage::from_error(&err, None)).await;
            return;
        }
    }

    // --- Join the room and confirm with the authoritative snapshot ---
    let mut rx = state.registry.join(&trip_id, session_id).await;

    let snapshot = match state.store.snapshot(&trip_id).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            state.registry.leave(&trip_id, session_id).await;
            let err = SyncError::Persistence(e.to_string());
            tracing::warn!(%session_id, %trip_id, error = %err, "Snapshot unavailable at join");
            send_and_close(&mut sink, &ServerMessage::from_error(&err, None)).await;
            return;
        }
    };

    let joined = ServerMessage::RoomJoined {
        trip_id: trip_id.clone(),
        snapshot,
    };
    if send_message(&mut sink, &joined).await.is_err() {
        state.registry.leave(&trip_id, session_id).await;
        return;
    }
    tracing::info!(%session_id, %trip_id, email = %user.email, "Session joined room");

    // Sender task: forward registry frames to the WebSocket sink. The
    // sink is returned so the cleanup path can send a final Close after
    // the channel drains.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
        sink
    });

    // --- Inbound loop (sequential per session) ---
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let request = match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(request) => request,
                    Err(e) => {
                        let err = SyncError::Protocol(format!("malformed request: {e}"));
                        state
                            .registry
                            .send_to(&trip_id, session_id, &ServerMessage::from_error(&err, None))
                            .await;
                        break;
                    }
                };
                if handle_request(&state, &trip_id, session_id, &user, request).await {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(%session_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(%session_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    // Clean up: leaving the room drops the channel sender, so the pump
    // drains anything still queued (a terminating error frame reaches
    // the client before the close) and then exits on its own. In-flight
    // mutations from other sessions are unaffected.
    state.registry.leave(&trip_id, session_id).await;
    if let Ok(mut sink) = send_task.await {
        let _ = sink.send(Message::Close(None)).await;
    }
    tracing::info!(%session_id, %trip_id, "Session disconnected");
}

/// Process one parsed request. Returns `true` when the session should
/// terminate.
async fn handle_request(
    state: &AppState,
    trip_id: &str,
    session_id: Uuid,
    user: &UserRef,
    request: ClientMessage,
) -> bool {
    match request {
        ClientMessage::PlanMutate {
            request_id,
            section,
            op,
            id,
            payload,
        } => {
            // Success is confirmed by the broadcast echo; only errors
            // are sent back directly, and only to this session.
            if let Err(err) = state
                .router
                .apply(trip_id, section, op, id, payload, user)
                .await
            {
                tracing::debug!(%session_id, %trip_id, error = %err, "Mutation rejected");
                state
                    .registry
                    .send_to(trip_id, session_id, &ServerMessage::from_error(&err, request_id))
                    .await;
            }
            false
        }
        ClientMessage::SyncRequest => {
            match state.store.snapshot(trip_id).await {
                Ok(snapshot) => {
                    state
                        .registry
                        .send_to(trip_id, session_id, &ServerMessage::SyncSnapshot { snapshot })
                        .await;
                }
                Err(e) => {
                    let err = SyncError::Persistence(e.to_string());
                    state
                        .registry
                        .send_to(trip_id, session_id, &ServerMessage::from_error(&err, None))
                        .await;
                }
            }
            false
        }
        ClientMessage::RoomLeave => true,
        ClientMessage::RoomJoin { .. } => {
            let err = SyncError::Protocol("already joined a room on this connection".into());
            state
                .registry
                .send_to(trip_id, session_id, &ServerMessage::from_error(&err, None))
                .await;
            true
        }
    }
}

/// Read frames until the client's `room.join` arrives.
///
/// Any parseable-but-wrong first message, or unparseable text, is a
/// protocol error: the client must not be able to submit mutations
/// without having joined.
async fn read_join(stream: &mut SplitStream<WebSocket>) -> Result<Handshake, SyncError> {
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                return match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(ClientMessage::RoomJoin {
                        trip_id,
                        user,
                        invite_token,
                    }) => Ok(Handshake::Join {
                        trip_id,
                        user,
                        invite_token,
                    }),
                    Ok(_) => Err(SyncError::Protocol(
                        "first message must be room.join".into(),
                    )),
                    Err(e) => Err(SyncError::Protocol(format!("malformed join request: {e}"))),
                };
            }
            Ok(Message::Close(_)) => return Ok(Handshake::Gone),
            Ok(_) => {} // ignore ping/pong/binary noise before the join
            Err(_) => return Ok(Handshake::Gone),
        }
    }
    Ok(Handshake::Gone)
}

async fn send_message(
    sink: &mut (impl SinkExt<Message> + Unpin),
    message: &ServerMessage,
) -> Result<(), ()> {
    let json = serde_json::to_string(message).map_err(|_| ())?;
    sink.send(Message::Text(json.into())).await.map_err(|_| ())
}

async fn send_and_close(sink: &mut (impl SinkExt<Message> + Unpin), message: &ServerMessage) {
    let _ = send_message(sink, message).await;
    let _ = sink.send(Message::Close(None)).await;
}
