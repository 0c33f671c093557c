//! Error taxonomy for the synchronization core.
//!
//! The four variants map one-to-one onto the protocol's failure surfaces:
//! authorization failures terminate the join attempt, validation and
//! persistence failures go back to the requesting session only, and
//! protocol failures may terminate the connection. Errors never fan out
//! to other sessions in a room.

use thiserror::Error;

/// A failure inside the sync core.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// The join handshake was rejected. Carries a human-readable reason
    /// ("trip not found", "invitation expired", ...).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The mutation request was malformed for its declared section or
    /// operation. Nothing was persisted, nothing is broadcast.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The plan store was unavailable or timed out. Retryable by the
    /// client; the core never retries internally to avoid duplicate
    /// application.
    #[error("persistence failed: {0}")]
    Persistence(String),

    /// The request frame itself could not be understood. May terminate
    /// the session.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl SyncError {
    /// Stable machine-readable code carried on `plan.error` frames.
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::Unauthorized(_) => "unauthorized",
            SyncError::Validation(_) => "validation",
            SyncError::Persistence(_) => "persistence",
            SyncError::Protocol(_) => "protocol",
        }
    }

    /// Whether the client may safely retry the same request.
    ///
    /// Only persistence failures are retryable: the mutation was never
    /// applied, so resubmitting cannot duplicate it.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Persistence(_))
    }

    /// The human-readable message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            SyncError::Unauthorized(m)
            | SyncError::Validation(m)
            | SyncError::Persistence(m)
            | SyncError::Protocol(m) => m,
        }
    }
}
