//! Trip-plan synchronization gateway.
//!
//! Exposes the building blocks (config, state, identity resolver, room
//! registry, mutation router, WebSocket infrastructure) so integration
//! tests and the binary entrypoint can both access them.

pub mod auth;
pub mod config;
pub mod plan;
pub mod rooms;
pub mod routes;
pub mod state;
pub mod ws;
