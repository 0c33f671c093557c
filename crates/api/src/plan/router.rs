use std::sync::Arc;

use serde_json::Value;

use tripsync_core::error::SyncError;
use tripsync_core::plan::{
    merge_payload, validate_budget_amount, validate_new_payload, validate_update_payload,
    MutationEvent, PlanItem, PlanSection,
};
use tripsync_core::protocol::{MutationOp, ServerMessage};
use tripsync_core::types::UserRef;
use tripsync_db::PlanStore;

use crate::rooms::RoomRegistry;

/// Applies mutation requests to the plan store and fans the resulting
/// canonical events out to the trip's room.
///
/// The ordering invariant lives here: every broadcast corresponds to a
/// store write that already succeeded. Validation and persistence
/// failures are returned to the caller (the requesting session) and are
/// never broadcast.
pub struct PlanRouter {
    store: Arc<dyn PlanStore>,
    registry: Arc<RoomRegistry>,
}

impl PlanRouter {
    pub fn new(store: Arc<dyn PlanStore>, registry: Arc<RoomRegistry>) -> Self {
        Self { store, registry }
    }

    /// Validate and apply one mutation, then broadcast it.
    ///
    /// Returns the broadcast event, or `None` for an idempotent no-op
    /// (deleting an already-absent item): that is success, but there is
    /// nothing to tell the room.
    ///
    /// There is no retry and no cancellation once the store call has
    /// started; a partially-slow write that ultimately succeeds is
    /// committed and will broadcast even if the requester has left.
    pub async fn apply(
        &self,
        trip_id: &str,
        section: PlanSection,
        op: MutationOp,
        id: Option<String>,
        payload: Option<Value>,
        actor: &UserRef,
    ) -> Result<Option<MutationEvent>, SyncError> {
        let event = match (section, op) {
            (PlanSection::Budget, MutationOp::Update) => {
                let payload = require_payload(payload)?;
                let amount = validate_budget_amount(&payload).map_err(SyncError::Validation)?;
                self.store.set_budget(trip_id, amount).await?;
                tracing::debug!(trip_id, amount, "Budget set");
                MutationEvent::BudgetSet {
                    amount,
                    set_by: actor.clone(),
                }
            }
            (PlanSection::Budget, _) => {
                return Err(SyncError::Validation(
                    "budget is a scalar and only supports the update operation".into(),
                ));
            }
            (_, MutationOp::Add) => {
                let payload = require_payload(payload)?;
                validate_new_payload(section, &payload).map_err(SyncError::Validation)?;

                // Client-generated ids are kept so the sender's
                // optimistic insert and the echo reconcile by id.
                let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                let item = PlanItem::new(id, section, payload, actor.clone());
                let item = self.store.upsert_item(trip_id, section, item).await?;
                tracing::debug!(trip_id, %section, item_id = %item.id, "Item added");
                MutationEvent::Added {
                    section,
                    item,
                    added_by: actor.clone(),
                }
            }
            (_, MutationOp::Update) => {
                let id = require_id(id)?;
                let payload = require_payload(payload)?;
                validate_update_payload(&payload).map_err(SyncError::Validation)?;

                // Updating a nonexistent id is an error, not an
                // implicit create.
                let mut item = self
                    .store
                    .get_item(trip_id, section, &id)
                    .await?
                    .ok_or_else(|| {
                        SyncError::Validation(format!("no {section} item with id '{id}'"))
                    })?;

                merge_payload(&mut item.payload, &payload);
                item.updated_by = Some(actor.clone());
                item.updated_at = chrono::Utc::now();

                let item = self.store.upsert_item(trip_id, section, item).await?;
                tracing::debug!(trip_id, %section, item_id = %item.id, "Item updated");
                MutationEvent::Updated {
                    section,
                    item,
                    updated_by: actor.clone(),
                }
            }
            (_, MutationOp::Delete) => {
                let id = require_id(id)?;
                let existed = self.store.delete_item(trip_id, section, &id).await?;
                if !existed {
                    // Concurrent deletes are expected; the second one is
                    // a silent success with nothing to broadcast.
                    tracing::debug!(trip_id, %section, item_id = %id, "Delete of absent item");
                    return Ok(None);
                }
                tracing::debug!(trip_id, %section, item_id = %id, "Item deleted");
                MutationEvent::Deleted {
                    section,
                    item_id: id,
                    deleted_by: actor.clone(),
                }
            }
        };

        // The store write above succeeded; only now does anyone hear
        // about it.
        self.registry
            .broadcast(trip_id, &ServerMessage::from_event(event.clone()))
            .await;
        Ok(Some(event))
    }
}

fn require_payload(payload: Option<Value>) -> Result<Value, SyncError> {
    payload.ok_or_else(|| SyncError::Validation("'payload' is required".into()))
}

fn require_id(id: Option<String>) -> Result<String, SyncError> {
    id.ok_or_else(|| SyncError::Validation("'id' is required".into()))
}
