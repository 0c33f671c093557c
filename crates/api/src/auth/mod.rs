//! Join authorization for trip rooms.

mod resolver;

pub use resolver::{reasons, IdentityResolver};
