//! Client-side companion to the trip-room sync gateway.
//!
//! Three pieces:
//! - [`replica::PlanReplica`] keeps a local copy of the trip plan and
//!   folds broadcast mutations into it idempotently.
//! - [`connection::SyncClient`] speaks the join handshake and frame
//!   protocol over a WebSocket.
//! - [`supervisor::Supervisor`] watches the connection, reconnects with
//!   exponential backoff, and resyncs the replica from the fresh
//!   `room.joined` snapshot instead of replaying missed deltas.

pub mod connection;
pub mod replica;
pub mod supervisor;

pub use connection::{ClientError, SyncClient, SyncConnection};
pub use replica::PlanReplica;
pub use supervisor::{BackoffConfig, ConnectionStatus, Connector, Supervisor};
