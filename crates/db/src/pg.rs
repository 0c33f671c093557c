//! Postgres implementations of the collaborator contracts.
//!
//! One adapter struct per contract, each holding a clone of the shared
//! pool. Upserts key on (trip_id, section, item_id) so concurrent
//! writers to the same item are serialized by the database row, not by
//! the router.

use async_trait::async_trait;
use sqlx::FromRow;

use tripsync_core::plan::{InvitePass, PlanItem, PlanSection, PlanSnapshot};
use tripsync_core::types::{Timestamp, UserRef};

use crate::{DbPool, InviteValidator, PlanStore, StoreError, TripDirectory};

/// Column list for plan item queries.
const ITEM_COLUMNS: &str =
    "trip_id, section, item_id, payload, created_by, updated_by, created_at, updated_at";

/// A `plan_items` row. Authorship is stored as JSONB because the sync
/// core does not own the user schema.
#[derive(Debug, FromRow)]
struct PlanItemRow {
    #[allow(dead_code)]
    trip_id: String,
    section: String,
    item_id: String,
    payload: serde_json::Value,
    created_by: serde_json::Value,
    updated_by: Option<serde_json::Value>,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl PlanItemRow {
    fn into_item(self) -> Result<PlanItem, StoreError> {
        let section = PlanSection::parse(&self.section)
            .ok_or_else(|| StoreError::Unavailable(format!("unknown section row: {}", self.section)))?;
        let created_by: UserRef = serde_json::from_value(self.created_by)
            .map_err(|e| StoreError::Unavailable(format!("corrupt created_by: {e}")))?;
        let updated_by = match self.updated_by {
            Some(value) => Some(
                serde_json::from_value(value)
                    .map_err(|e| StoreError::Unavailable(format!("corrupt updated_by: {e}")))?,
            ),
            None => None,
        };
        Ok(PlanItem {
            id: self.item_id,
            section,
            payload: self.payload,
            created_by,
            updated_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Unavailable(e.to_string()))
}

// ---------------------------------------------------------------------------
// Plan store
// ---------------------------------------------------------------------------

/// Postgres-backed [`PlanStore`].
#[derive(Clone)]
pub struct PgPlanStore {
    pool: DbPool,
}

impl PgPlanStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlanStore for PgPlanStore {
    async fn snapshot(&self, trip_id: &str) -> Result<PlanSnapshot, StoreError> {
        let query = format!(
            "SELECT {ITEM_COLUMNS} FROM plan_items
             WHERE trip_id = $1
             ORDER BY created_at ASC, item_id ASC"
        );
        let rows: Vec<PlanItemRow> = sqlx::query_as(&query)
            .bind(trip_id)
            .fetch_all(&self.pool)
            .await?;

        let mut snapshot = PlanSnapshot::default();
        for row in rows {
            let item = row.into_item()?;
            if let Some(items) = snapshot.items_mut(item.section) {
                items.push(item);
            }
        }

        let budget: Option<(f64,)> = sqlx::query_as("SELECT budget FROM trips WHERE id = $1")
            .bind(trip_id)
            .fetch_optional(&self.pool)
            .await?;
        snapshot.budget = budget.map(|(b,)| b).unwrap_or(0.0);

        Ok(snapshot)
    }

    async fn get_item(
        &self,
        trip_id: &str,
        section: PlanSection,
        item_id: &str,
    ) -> Result<Option<PlanItem>, StoreError> {
        let query = format!(
            "SELECT {ITEM_COLUMNS} FROM plan_items
             WHERE trip_id = $1 AND section = $2 AND item_id = $3"
        );
        let row: Option<PlanItemRow> = sqlx::query_as(&query)
            .bind(trip_id)
            .bind(section.as_str())
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(PlanItemRow::into_item).transpose()
    }

    async fn upsert_item(
        &self,
        trip_id: &str,
        section: PlanSection,
        item: PlanItem,
    ) -> Result<PlanItem, StoreError> {
        // On conflict only the mutable columns are replaced; created_by
        // and created_at keep the original row's values.
        let query = format!(
            "INSERT INTO plan_items
                (trip_id, section, item_id, payload, created_by, updated_by,
                 created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (trip_id, section, item_id) DO UPDATE SET
                payload = EXCLUDED.payload,
                updated_by = EXCLUDED.updated_by,
                updated_at = EXCLUDED.updated_at
             RETURNING {ITEM_COLUMNS}"
        );
        let row: PlanItemRow = sqlx::query_as(&query)
            .bind(trip_id)
            .bind(section.as_str())
            .bind(&item.id)
            .bind(&item.payload)
            .bind(to_json(&item.created_by)?)
            .bind(item.updated_by.as_ref().map(to_json).transpose()?)
            .bind(item.created_at)
            .bind(item.updated_at)
            .fetch_one(&self.pool)
            .await?;
        row.into_item()
    }

    async fn delete_item(
        &self,
        trip_id: &str,
        section: PlanSection,
        item_id: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "DELETE FROM plan_items
             WHERE trip_id = $1 AND section = $2 AND item_id = $3",
        )
        .bind(trip_id)
        .bind(section.as_str())
        .bind(item_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_budget(&self, trip_id: &str, amount: f64) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO trips (id, budget) VALUES ($1, $2)
             ON CONFLICT (id) DO UPDATE SET budget = EXCLUDED.budget",
        )
        .bind(trip_id)
        .bind(amount)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Trip directory
// ---------------------------------------------------------------------------

/// Postgres-backed [`TripDirectory`].
#[derive(Clone)]
pub struct PgTripDirectory {
    pool: DbPool,
}

impl PgTripDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TripDirectory for PgTripDirectory {
    async fn tripmate_emails(&self, trip_id: &str) -> Result<Option<Vec<String>>, StoreError> {
        let exists: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM trips WHERE id = $1")
            .bind(trip_id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Ok(None);
        }

        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT email FROM tripmates WHERE trip_id = $1 ORDER BY added_at ASC")
                .bind(trip_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(Some(rows.into_iter().map(|(email,)| email).collect()))
    }

    async fn add_tripmate(&self, trip_id: &str, email: &str) -> Result<(), StoreError> {
        // Idempotent: a second grant for the same (trip, email) hits the
        // primary key and does nothing. Emails are stored lowercased so
        // the key matches the resolver's case-insensitive comparison.
        let result = sqlx::query(
            "INSERT INTO tripmates (trip_id, email) VALUES ($1, lower($2))
             ON CONFLICT (trip_id, email) DO NOTHING",
        )
        .bind(trip_id)
        .bind(email)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            tracing::info!(trip_id, email, "Tripmate added");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Invite validator
// ---------------------------------------------------------------------------

/// Postgres-backed [`InviteValidator`].
#[derive(Clone)]
pub struct PgInviteValidator {
    pool: DbPool,
}

impl PgInviteValidator {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InviteValidator for PgInviteValidator {
    async fn validate(&self, token: &str) -> Result<Option<InvitePass>, StoreError> {
        let row: Option<(String, String, Timestamp)> =
            sqlx::query_as("SELECT trip_id, email, expires_at FROM invites WHERE token = $1")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(trip_id, email, expires_at)| InvitePass {
            trip_id,
            email,
            expires_at,
        }))
    }
}
