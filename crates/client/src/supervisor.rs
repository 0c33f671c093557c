//! Disconnection supervision and exponential-backoff reconnection.
//!
//! When the connection to the gateway drops, the client marks itself
//! [`ConnectionStatus::Disconnected`] (the UI should block destructive
//! actions; nothing is queued) and calls [`Supervisor::reconnect`] to
//! retry with increasing delays. A successful reconnect runs the full
//! join handshake again and resyncs the replica from the fresh
//! `room.joined` snapshot, instead of replaying the frames it missed.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use tripsync_core::plan::PlanSnapshot;

use crate::connection::ClientError;
use crate::replica::PlanReplica;

/// Connection lifecycle as seen by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Joined and receiving broadcasts.
    Connected,
    /// The connection dropped; a reconnect has not started yet.
    Disconnected,
    /// Currently retrying; `attempt` counts from 1.
    Reconnecting { attempt: u32 },
    /// Retries are exhausted. Terminal: recovery requires a fresh
    /// client (manual reload).
    Lost,
}

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the second reconnection attempt (the first fires
    /// immediately).
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
    /// Attempts before giving up with [`ConnectionStatus::Lost`].
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 10,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`BackoffConfig::max_delay`].
pub fn next_delay(current: Duration, config: &BackoffConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// How the supervisor re-establishes a session.
///
/// [`SyncClient`](crate::connection::SyncClient) is the production
/// implementation; tests substitute scripted connectors.
#[async_trait]
pub trait Connector: Send + Sync {
    /// A live, joined session.
    type Handle: Send;

    /// Run the full connect-and-join handshake, returning the session
    /// handle and the authoritative snapshot from `room.joined`.
    async fn connect(&self) -> Result<(Self::Handle, PlanSnapshot), ClientError>;
}

/// Watches one connection's lifecycle and drives reconnection.
pub struct Supervisor {
    backoff: BackoffConfig,
    status_tx: watch::Sender<ConnectionStatus>,
    cancel: CancellationToken,
}

impl Supervisor {
    pub fn new(backoff: BackoffConfig) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            backoff,
            status_tx,
            cancel: CancellationToken::new(),
        }
    }

    /// Subscribe to status changes (for UI consumption).
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// Token that stops an in-flight reconnect loop (e.g. on page
    /// teardown).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Record that the initial connection is up.
    pub fn mark_connected(&self) {
        self.status_tx.send_replace(ConnectionStatus::Connected);
    }

    /// Record that the connection dropped. The UI should block
    /// destructive actions until the status is `Connected` again.
    pub fn mark_disconnected(&self) {
        self.status_tx.send_replace(ConnectionStatus::Disconnected);
    }

    /// Retry the connect-and-join handshake with exponential backoff.
    ///
    /// On success the replica is resynced from the fresh snapshot and
    /// the new session handle is returned. Returns `None` when the
    /// cancel token fires or when `max_attempts` failures leave the
    /// supervisor in the terminal [`ConnectionStatus::Lost`] state.
    pub async fn reconnect<C: Connector>(
        &self,
        connector: &C,
        replica: &mut PlanReplica,
    ) -> Option<C::Handle> {
        let mut delay = self.backoff.initial_delay;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            if attempt > self.backoff.max_attempts {
                tracing::warn!(
                    attempts = self.backoff.max_attempts,
                    "Reconnect attempts exhausted, giving up",
                );
                self.status_tx.send_replace(ConnectionStatus::Lost);
                return None;
            }
            self.status_tx
                .send_replace(ConnectionStatus::Reconnecting { attempt });
            tracing::info!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting to trip room",
            );

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("Reconnect cancelled");
                    return None;
                }
                result = connector.connect() => {
                    match result {
                        Ok((handle, snapshot)) => {
                            replica.resync(&snapshot);
                            self.status_tx.send_replace(ConnectionStatus::Connected);
                            tracing::info!(attempt, "Reconnected and resynced");
                            return Some(handle);
                        }
                        Err(e) => {
                            tracing::warn!(
                                error = %e,
                                "Reconnect attempt {attempt} failed",
                            );
                        }
                    }
                }
            }

            // Wait before the next attempt, respecting cancellation.
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }

            delay = next_delay(delay, &self.backoff);
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
