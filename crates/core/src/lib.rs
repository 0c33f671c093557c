//! Domain model and wire protocol for collaborative trip-plan sync.
//!
//! This crate has no internal dependencies so that the server, the
//! storage adapters, and the client-side reconciliation layer can all
//! share the same section enum, item types, message protocol, and error
//! taxonomy.

pub mod error;
pub mod plan;
pub mod protocol;
pub mod types;
