use serde::{Deserialize, Serialize};

/// Trips are identified by opaque string ids minted by the platform.
pub type TripId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// The identity a connection claims (and, after the join handshake,
/// is authorized as). The platform gateway authenticates the user
/// before the socket reaches us; we only carry the identity along.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: String,
    pub email: String,
    pub fullname: String,
}

impl UserRef {
    /// Emails are compared case-insensitively everywhere (tripmate
    /// lists, invite targets).
    pub fn email_matches(&self, other: &str) -> bool {
        self.email.eq_ignore_ascii_case(other)
    }
}
