use std::sync::Arc;

use tripsync_core::error::SyncError;
use tripsync_core::types::UserRef;
use tripsync_db::{InviteValidator, TripDirectory};

/// Denial reasons surfaced to the client on `room.denied`.
pub mod reasons {
    pub const TRIP_NOT_FOUND: &str = "trip not found";
    pub const NOT_A_TRIPMATE: &str = "not a tripmate and no valid invitation";
    pub const INVITE_EXPIRED: &str = "invitation expired";
    pub const INVITE_MISMATCH: &str = "invitation not valid for this account";
}

/// Decides whether a connection may join a trip room.
///
/// A user is allowed in if their email is on the trip's tripmate list,
/// or if they present a valid invite token for that trip and email. A
/// successful invite redemption grants standing membership as a side
/// effect, so the next join needs no token.
pub struct IdentityResolver {
    directory: Arc<dyn TripDirectory>,
    invites: Arc<dyn InviteValidator>,
}

impl IdentityResolver {
    pub fn new(directory: Arc<dyn TripDirectory>, invites: Arc<dyn InviteValidator>) -> Self {
        Self { directory, invites }
    }

    /// Authorize a join attempt.
    ///
    /// Returns `Err(SyncError::Unauthorized)` with a human-readable
    /// reason on denial, `Err(SyncError::Persistence)` when a
    /// collaborator is unreachable.
    ///
    /// The membership grant goes through the directory's idempotent
    /// upsert, so two concurrent redemptions of the same invite both
    /// succeed and the tripmate is added exactly once.
    pub async fn authorize(
        &self,
        trip_id: &str,
        user: &UserRef,
        invite_token: Option<&str>,
    ) -> Result<(), SyncError> {
        let tripmates = self
            .directory
            .tripmate_emails(trip_id)
            .await?
            .ok_or_else(|| SyncError::Unauthorized(reasons::TRIP_NOT_FOUND.into()))?;

        if tripmates.iter().any(|email| user.email_matches(email)) {
            return Ok(());
        }

        let Some(token) = invite_token else {
            return Err(SyncError::Unauthorized(reasons::NOT_A_TRIPMATE.into()));
        };

        let Some(pass) = self.invites.validate(token).await? else {
            return Err(SyncError::Unauthorized(reasons::NOT_A_TRIPMATE.into()));
        };

        if pass.trip_id != trip_id || !user.email_matches(&pass.email) {
            return Err(SyncError::Unauthorized(reasons::INVITE_MISMATCH.into()));
        }

        if pass.is_expired(chrono::Utc::now()) {
            return Err(SyncError::Unauthorized(reasons::INVITE_EXPIRED.into()));
        }

        self.directory.add_tripmate(trip_id, &user.email).await?;
        tracing::info!(trip_id, email = %user.email, "Invite redeemed, tripmate granted");
        Ok(())
    }
}
