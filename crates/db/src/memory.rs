//! In-memory implementation of all three collaborator contracts.
//!
//! Used by the test suites and for running the gateway without a
//! database. Behaviour matches the Postgres adapters: per-item upserts
//! are last-write-wins, tripmate grants are idempotent, snapshots are
//! ordered by creation time.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use tripsync_core::plan::{InvitePass, PlanItem, PlanSection, PlanSnapshot, COLLECTION_SECTIONS};

use crate::{InviteValidator, PlanStore, StoreError, TripDirectory};

#[derive(Default)]
struct TripState {
    tripmates: Vec<String>,
    items: HashMap<PlanSection, HashMap<String, PlanItem>>,
    budget: f64,
}

#[derive(Default)]
struct Inner {
    trips: HashMap<String, TripState>,
    invites: HashMap<String, InvitePass>,
    unavailable: bool,
}

/// One store serving all three collaborator roles, guarded by a single
/// `RwLock`.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a trip with its tripmate emails.
    pub async fn add_trip(&self, trip_id: &str, tripmates: &[&str]) {
        let mut inner = self.inner.write().await;
        let trip = inner.trips.entry(trip_id.to_string()).or_default();
        trip.tripmates = tripmates.iter().map(|s| s.to_string()).collect();
    }

    /// Seed an invite token.
    pub async fn add_invite(&self, token: &str, pass: InvitePass) {
        self.inner.write().await.invites.insert(token.to_string(), pass);
    }

    /// Toggle simulated outage: while set, every operation fails with
    /// [`StoreError::Unavailable`].
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.inner.write().await.unavailable = unavailable;
    }

    async fn check_available(&self) -> Result<(), StoreError> {
        if self.inner.read().await.unavailable {
            return Err(StoreError::Unavailable("simulated outage".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PlanStore for MemoryStore {
    async fn snapshot(&self, trip_id: &str) -> Result<PlanSnapshot, StoreError> {
        self.check_available().await?;
        let inner = self.inner.read().await;
        let mut snapshot = PlanSnapshot::default();
        if let Some(trip) = inner.trips.get(trip_id) {
            for section in COLLECTION_SECTIONS {
                let mut items: Vec<PlanItem> = trip
                    .items
                    .get(&section)
                    .map(|m| m.values().cloned().collect())
                    .unwrap_or_default();
                items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
                if let Some(slot) = snapshot.items_mut(section) {
                    *slot = items;
                }
            }
            snapshot.budget = trip.budget;
        }
        Ok(snapshot)
    }

    async fn get_item(
        &self,
        trip_id: &str,
        section: PlanSection,
        item_id: &str,
    ) -> Result<Option<PlanItem>, StoreError> {
        self.check_available().await?;
        let inner = self.inner.read().await;
        Ok(inner
            .trips
            .get(trip_id)
            .and_then(|trip| trip.items.get(&section))
            .and_then(|items| items.get(item_id))
            .cloned())
    }

    async fn upsert_item(
        &self,
        trip_id: &str,
        section: PlanSection,
        item: PlanItem,
    ) -> Result<PlanItem, StoreError> {
        self.check_available().await?;
        let mut inner = self.inner.write().await;
        let trip = inner.trips.entry(trip_id.to_string()).or_default();
        trip.items
            .entry(section)
            .or_default()
            .insert(item.id.clone(), item.clone());
        Ok(item)
    }

    async fn delete_item(
        &self,
        trip_id: &str,
        section: PlanSection,
        item_id: &str,
    ) -> Result<bool, StoreError> {
        self.check_available().await?;
        let mut inner = self.inner.write().await;
        let removed = inner
            .trips
            .get_mut(trip_id)
            .and_then(|trip| trip.items.get_mut(&section))
            .and_then(|items| items.remove(item_id));
        Ok(removed.is_some())
    }

    async fn set_budget(&self, trip_id: &str, amount: f64) -> Result<(), StoreError> {
        self.check_available().await?;
        let mut inner = self.inner.write().await;
        inner.trips.entry(trip_id.to_string()).or_default().budget = amount;
        Ok(())
    }
}

#[async_trait]
impl TripDirectory for MemoryStore {
    async fn tripmate_emails(&self, trip_id: &str) -> Result<Option<Vec<String>>, StoreError> {
        self.check_available().await?;
        let inner = self.inner.read().await;
        Ok(inner.trips.get(trip_id).map(|trip| trip.tripmates.clone()))
    }

    async fn add_tripmate(&self, trip_id: &str, email: &str) -> Result<(), StoreError> {
        self.check_available().await?;
        let mut inner = self.inner.write().await;
        let trip = inner.trips.entry(trip_id.to_string()).or_default();
        if !trip
            .tripmates
            .iter()
            .any(|e| e.eq_ignore_ascii_case(email))
        {
            trip.tripmates.push(email.to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl InviteValidator for MemoryStore {
    async fn validate(&self, token: &str) -> Result<Option<InvitePass>, StoreError> {
        self.check_available().await?;
        let inner = self.inner.read().await;
        Ok(inner.invites.get(token).cloned())
    }
}
