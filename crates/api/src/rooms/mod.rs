//! Trip rooms: the in-memory fan-out layer.
//!
//! A room is the set of live sessions for one trip. Rooms are created
//! lazily on first join and dropped when the last member leaves; they
//! are purely routing state and are never persisted.

mod registry;

pub use registry::{RoomRegistry, SessionId};
