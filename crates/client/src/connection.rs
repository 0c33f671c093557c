//! WebSocket client for the trip-room sync gateway.
//!
//! [`SyncClient`] holds the connection configuration for one trip room.
//! Call [`SyncClient::connect`] to run the join handshake and obtain a
//! live [`SyncConnection`].

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use tripsync_core::plan::{MutationEvent, PlanSection, PlanSnapshot};
use tripsync_core::protocol::{ClientMessage, MutationOp, ServerMessage};
use tripsync_core::types::{TripId, UserRef};

/// Configuration handle for one trip room on one gateway.
///
/// Stores the gateway URL and the identity to join as. Create a
/// [`SyncConnection`] by calling [`connect`](Self::connect).
#[derive(Debug, Clone)]
pub struct SyncClient {
    ws_url: String,
    trip_id: TripId,
    user: UserRef,
    invite_token: Option<String>,
}

/// A live, joined connection to a trip room.
///
/// The join handshake has already completed; `snapshot` is the
/// authoritative plan state as of the join.
pub struct SyncConnection {
    /// The trip room this connection belongs to.
    pub trip_id: TripId,
    /// Plan state delivered with `room.joined`.
    pub snapshot: PlanSnapshot,
    stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl SyncClient {
    /// Create a client targeting one trip room.
    ///
    /// * `ws_url` - gateway WebSocket URL, e.g. `ws://host:3000/ws`.
    /// * `user`   - the identity already authenticated upstream.
    pub fn new(ws_url: String, trip_id: TripId, user: UserRef) -> Self {
        Self {
            ws_url,
            trip_id,
            user,
            invite_token: None,
        }
    }

    /// Attach an invite token, for users who are not yet tripmates.
    /// Redeeming it once grants standing membership; later connects do
    /// not need the token again.
    pub fn with_invite_token(mut self, token: String) -> Self {
        self.invite_token = Some(token);
        self
    }

    pub fn trip_id(&self) -> &str {
        &self.trip_id
    }

    /// Connect and run the join handshake.
    ///
    /// Sends `room.join` as the first frame and waits for the verdict:
    /// `room.joined` yields a live connection, `room.denied` becomes
    /// [`ClientError::Denied`] with the server's reason.
    pub async fn connect(&self) -> Result<SyncConnection, ClientError> {
        let (mut stream, _response) = connect_async(&self.ws_url).await.map_err(|e| {
            ClientError::Connection(format!("Failed to connect to {}: {e}", self.ws_url))
        })?;

        let join = ClientMessage::RoomJoin {
            trip_id: self.trip_id.clone(),
            user: self.user.clone(),
            invite_token: self.invite_token.clone(),
        };
        let text = serde_json::to_string(&join)
            .map_err(|e| ClientError::Protocol(format!("Failed to encode room.join: {e}")))?;
        stream
            .send(Message::Text(text))
            .await
            .map_err(|e| ClientError::Connection(format!("Failed to send room.join: {e}")))?;

        // The server replies to the join before anything else, so the
        // first protocol frame is the verdict.
        loop {
            let frame = match stream.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    return Err(ClientError::Connection(format!(
                        "Connection failed during join: {e}"
                    )))
                }
                None => {
                    return Err(ClientError::Connection(
                        "Connection closed during join".into(),
                    ))
                }
            };
            match frame {
                Message::Text(text) => {
                    let msg: ServerMessage = serde_json::from_str(&text).map_err(|e| {
                        ClientError::Protocol(format!("Unparseable join reply: {e}"))
                    })?;
                    return match msg {
                        ServerMessage::RoomJoined { trip_id, snapshot } => {
                            tracing::info!(%trip_id, "Joined trip room");
                            Ok(SyncConnection {
                                trip_id,
                                snapshot,
                                stream,
                            })
                        }
                        ServerMessage::RoomDenied { reason } => Err(ClientError::Denied(reason)),
                        other => Err(ClientError::Protocol(format!(
                            "Expected a join verdict, got: {other:?}"
                        ))),
                    };
                }
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Close(_) => {
                    return Err(ClientError::Connection(
                        "Server closed the connection during join".into(),
                    ))
                }
                other => {
                    return Err(ClientError::Protocol(format!(
                        "Unexpected frame during join: {other:?}"
                    )))
                }
            }
        }
    }
}

impl SyncConnection {
    /// Send one mutation request.
    ///
    /// Success comes back as a broadcast through
    /// [`next_event`](Self::next_event); only failures arrive as a
    /// scoped `plan.error` frame.
    pub async fn send_mutation(
        &mut self,
        request_id: Option<String>,
        section: PlanSection,
        op: MutationOp,
        id: Option<String>,
        payload: Option<serde_json::Value>,
    ) -> Result<(), ClientError> {
        self.send(&ClientMessage::PlanMutate {
            request_id,
            section,
            op,
            id,
            payload,
        })
        .await
    }

    /// Ask for a fresh authoritative snapshot (`sync.snapshot` reply).
    pub async fn request_sync(&mut self) -> Result<(), ClientError> {
        self.send(&ClientMessage::SyncRequest).await
    }

    /// Leave the room without dropping the socket.
    pub async fn leave(&mut self) -> Result<(), ClientError> {
        self.send(&ClientMessage::RoomLeave).await
    }

    async fn send(&mut self, msg: &ClientMessage) -> Result<(), ClientError> {
        let text = serde_json::to_string(msg)
            .map_err(|e| ClientError::Protocol(format!("Failed to encode frame: {e}")))?;
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| ClientError::Connection(format!("Failed to send frame: {e}")))
    }

    /// Wait for the next protocol frame, skipping transport frames.
    ///
    /// Returns `None` when the server closes the connection; the caller
    /// should hand control to the supervisor at that point.
    pub async fn next_frame(&mut self) -> Result<Option<ServerMessage>, ClientError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    let msg: ServerMessage = serde_json::from_str(&text)
                        .map_err(|e| ClientError::Protocol(format!("Unparseable frame: {e}")))?;
                    return Ok(Some(msg));
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Err(ClientError::Connection(format!("Connection failed: {e}")))
                }
            }
        }
    }

    /// Like [`next_frame`](Self::next_frame) but unwraps broadcast
    /// frames into the mutation they carry, ready to feed a
    /// [`PlanReplica`](crate::replica::PlanReplica). Non-broadcast
    /// frames (errors, snapshots) are skipped.
    pub async fn next_event(&mut self) -> Result<Option<MutationEvent>, ClientError> {
        loop {
            match self.next_frame().await? {
                Some(frame) => {
                    if let Some(event) = frame.into_event() {
                        return Ok(Some(event));
                    }
                }
                None => return Ok(None),
            }
        }
    }

    /// Close the connection cleanly.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.stream
            .close(None)
            .await
            .map_err(|e| ClientError::Connection(format!("Failed to close: {e}")))
    }
}

/// The production connector: reconnection runs the same handshake as
/// the initial connect.
#[async_trait]
impl crate::supervisor::Connector for SyncClient {
    type Handle = SyncConnection;

    async fn connect(&self) -> Result<(SyncConnection, PlanSnapshot), ClientError> {
        let conn = SyncClient::connect(self).await?;
        let snapshot = conn.snapshot.clone();
        Ok((conn, snapshot))
    }
}

/// Errors that can occur when talking to the gateway.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Failed to establish or keep the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The server refused the join; the reason should be shown to the
    /// user as a blocking message.
    #[error("Join denied: {0}")]
    Denied(String),

    /// A malformed or unexpected frame on an established connection.
    #[error("Protocol error: {0}")]
    Protocol(String),
}
