//! Storage adapters for the sync core's external collaborators.
//!
//! The core persists plan mutations and looks up trip membership through
//! the three traits defined here; it never owns schema design for those
//! entities. [`pg`] holds the production Postgres implementation,
//! [`memory`] an in-process implementation used by tests and local
//! development.

pub mod memory;
pub mod pg;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use tripsync_core::plan::{InvitePass, PlanItem, PlanSection, PlanSnapshot};

/// Shared Postgres connection pool type.
pub type DbPool = PgPool;

/// Create a connection pool against the given database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Verify the database is reachable with a trivial query.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply pending migrations from the crate's `migrations/` directory.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure talking to a storage collaborator.
///
/// Deliberately a single variant: from the sync core's point of view
/// every store failure means "the mutation was not applied, tell the
/// requester to retry".
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

impl From<StoreError> for tripsync_core::error::SyncError {
    fn from(err: StoreError) -> Self {
        tripsync_core::error::SyncError::Persistence(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Collaborator contracts
// ---------------------------------------------------------------------------

/// Durable plan state, keyed per (trip, section, item id).
///
/// `upsert_item` must be atomic per key; concurrent writers to the same
/// item are serialized by the store (last write wins), not by the
/// mutation router.
#[async_trait]
pub trait PlanStore: Send + Sync {
    /// Full authoritative state for one trip.
    async fn snapshot(&self, trip_id: &str) -> Result<PlanSnapshot, StoreError>;

    /// Fetch one item, `None` if absent.
    async fn get_item(
        &self,
        trip_id: &str,
        section: PlanSection,
        item_id: &str,
    ) -> Result<Option<PlanItem>, StoreError>;

    /// Insert or replace an item, returning the canonical stored row.
    async fn upsert_item(
        &self,
        trip_id: &str,
        section: PlanSection,
        item: PlanItem,
    ) -> Result<PlanItem, StoreError>;

    /// Remove an item. Returns `false` when it was already absent,
    /// which is still success (concurrent deletes are expected).
    async fn delete_item(
        &self,
        trip_id: &str,
        section: PlanSection,
        item_id: &str,
    ) -> Result<bool, StoreError>;

    /// Replace the budget scalar.
    async fn set_budget(&self, trip_id: &str, amount: f64) -> Result<(), StoreError>;
}

/// Trip membership lookup and grant.
#[async_trait]
pub trait TripDirectory: Send + Sync {
    /// Tripmate emails for a trip, `None` when the trip does not exist.
    async fn tripmate_emails(&self, trip_id: &str) -> Result<Option<Vec<String>>, StoreError>;

    /// Grant membership. Idempotent: granting an existing tripmate is a
    /// no-op success, which is what makes concurrent invite redemptions
    /// exactly-once.
    async fn add_tripmate(&self, trip_id: &str, email: &str) -> Result<(), StoreError>;
}

/// Invite token lookup.
#[async_trait]
pub trait InviteValidator: Send + Sync {
    /// Resolve a token to its claims, `None` for unknown tokens. Expiry
    /// and email matching are the identity resolver's job so it can
    /// produce distinct denial reasons.
    async fn validate(&self, token: &str) -> Result<Option<InvitePass>, StoreError>;
}
