//! Local mirror of a trip plan.
//!
//! The replica is reconciliation-oriented rather than log-oriented:
//! every broadcast frame carries enough state to apply on its own, so
//! applying a frame twice (the sender's optimistic insert followed by
//! its own echo, or a frame seen both before and after a resync) lands
//! in the same state as applying it once.

use std::collections::HashMap;

use tripsync_core::plan::{
    merge_payload, MutationEvent, PlanItem, PlanSection, PlanSnapshot, COLLECTION_SECTIONS,
};

/// Client-side copy of one trip's plan.
#[derive(Debug, Default, Clone)]
pub struct PlanReplica {
    sections: HashMap<PlanSection, HashMap<String, PlanItem>>,
    budget: f64,
}

impl PlanReplica {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a replica directly from an authoritative snapshot.
    pub fn from_snapshot(snapshot: &PlanSnapshot) -> Self {
        let mut replica = Self::new();
        replica.resync(snapshot);
        replica
    }

    /// Current budget scalar.
    pub fn budget(&self) -> f64 {
        self.budget
    }

    /// Look up one item by section and id.
    pub fn item(&self, section: PlanSection, id: &str) -> Option<&PlanItem> {
        self.sections.get(&section).and_then(|items| items.get(id))
    }

    /// Number of items in one collection section.
    pub fn len(&self, section: PlanSection) -> usize {
        self.sections.get(&section).map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.sections.values().all(HashMap::is_empty)
    }

    /// Fold one broadcast mutation into the replica.
    pub fn apply(&mut self, event: MutationEvent) {
        match event {
            MutationEvent::Added { section, item, .. } => self.apply_added(section, item),
            MutationEvent::Updated { section, item, .. } => self.apply_updated(section, item),
            MutationEvent::Deleted {
                section, item_id, ..
            } => self.apply_deleted(section, &item_id),
            MutationEvent::BudgetSet { amount, .. } => self.apply_budget(amount),
        }
    }

    /// Insert an item, overwriting any local copy with the same id.
    ///
    /// Overwrite (rather than ignore) absorbs the echo of the replica
    /// owner's own optimistic insert: the echoed item carries the
    /// server-authoritative timestamps.
    pub fn apply_added(&mut self, section: PlanSection, item: PlanItem) {
        self.sections
            .entry(section)
            .or_default()
            .insert(item.id.clone(), item);
    }

    /// Merge an updated item into the local copy, or insert it whole
    /// when the replica never saw the add (an update frame carries the
    /// full post-merge item, so this is safe).
    pub fn apply_updated(&mut self, section: PlanSection, item: PlanItem) {
        let items = self.sections.entry(section).or_default();
        match items.get_mut(&item.id) {
            Some(existing) => {
                merge_payload(&mut existing.payload, &item.payload);
                existing.updated_by = item.updated_by;
                existing.updated_at = item.updated_at;
            }
            None => {
                items.insert(item.id.clone(), item);
            }
        }
    }

    /// Remove an item. Removing an id the replica does not hold is a
    /// silent no-op, so concurrent deletes converge.
    pub fn apply_deleted(&mut self, section: PlanSection, item_id: &str) {
        if let Some(items) = self.sections.get_mut(&section) {
            items.remove(item_id);
        }
    }

    /// Replace the budget scalar.
    pub fn apply_budget(&mut self, amount: f64) {
        self.budget = amount;
    }

    /// Discard local state and adopt an authoritative snapshot.
    ///
    /// Callable at any time; this is how a reconnected client catches
    /// up, instead of replaying broadcasts it missed.
    pub fn resync(&mut self, snapshot: &PlanSnapshot) {
        self.sections.clear();
        for section in COLLECTION_SECTIONS {
            if let Some(items) = snapshot.items(section) {
                let by_id = items
                    .iter()
                    .map(|item| (item.id.clone(), item.clone()))
                    .collect();
                self.sections.insert(section, by_id);
            }
        }
        self.budget = snapshot.budget;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tripsync_core::types::UserRef;

    fn user(email: &str) -> UserRef {
        UserRef {
            id: format!("user-{email}"),
            email: email.into(),
            fullname: email.split('@').next().unwrap_or("user").into(),
        }
    }

    fn note(id: &str, text: &str) -> PlanItem {
        PlanItem::new(
            id.into(),
            PlanSection::Notes,
            json!({"text": text}),
            user("ada@example.com"),
        )
    }

    fn added(item: PlanItem) -> MutationEvent {
        MutationEvent::Added {
            section: PlanSection::Notes,
            added_by: item.created_by.clone(),
            item,
        }
    }

    #[test]
    fn add_then_lookup() {
        let mut replica = PlanReplica::new();
        replica.apply(added(note("n1", "bring sunscreen")));

        assert_eq!(replica.len(PlanSection::Notes), 1);
        let item = replica.item(PlanSection::Notes, "n1").unwrap();
        assert_eq!(item.payload, json!({"text": "bring sunscreen"}));
    }

    #[test]
    fn applying_the_same_event_twice_equals_once() {
        let mut replica = PlanReplica::new();
        let event = added(note("n1", "bring sunscreen"));

        replica.apply(event.clone());
        replica.apply(event);
        assert_eq!(replica.len(PlanSection::Notes), 1);

        let delete = MutationEvent::Deleted {
            section: PlanSection::Notes,
            item_id: "n1".into(),
            deleted_by: user("bea@example.com"),
        };
        replica.apply(delete.clone());
        replica.apply(delete);
        assert_eq!(replica.len(PlanSection::Notes), 0);
    }

    #[test]
    fn echo_after_optimistic_insert_adopts_server_copy() {
        let mut replica = PlanReplica::new();

        // The user typed a note; the replica inserted it optimistically.
        replica.apply_added(PlanSection::Notes, note("n1", "bring sunscreen"));

        // The echo carries server timestamps and wins.
        let mut echoed = note("n1", "bring sunscreen");
        echoed.created_at = chrono::Utc::now() + chrono::Duration::seconds(5);
        let server_stamp = echoed.created_at;
        replica.apply(added(echoed));

        assert_eq!(replica.len(PlanSection::Notes), 1);
        let item = replica.item(PlanSection::Notes, "n1").unwrap();
        assert_eq!(item.created_at, server_stamp);
    }

    #[test]
    fn update_merges_into_existing_item() {
        let mut replica = PlanReplica::new();
        replica.apply_added(
            PlanSection::Notes,
            PlanItem::new(
                "n1".into(),
                PlanSection::Notes,
                json!({"text": "bring sunscreen", "pinned": true}),
                user("ada@example.com"),
            ),
        );

        let mut updated = note("n1", "bring SPF 50");
        updated.updated_by = Some(user("bea@example.com"));
        replica.apply(MutationEvent::Updated {
            section: PlanSection::Notes,
            updated_by: user("bea@example.com"),
            item: updated,
        });

        let item = replica.item(PlanSection::Notes, "n1").unwrap();
        assert_eq!(item.payload, json!({"text": "bring SPF 50", "pinned": true}));
        assert_eq!(item.updated_by, Some(user("bea@example.com")));
    }

    #[test]
    fn update_before_add_inserts_the_item() {
        // A replica built from a snapshot taken just before the add can
        // legitimately see the update first.
        let mut replica = PlanReplica::new();
        replica.apply(MutationEvent::Updated {
            section: PlanSection::Notes,
            updated_by: user("bea@example.com"),
            item: note("n1", "bring SPF 50"),
        });

        assert_eq!(replica.len(PlanSection::Notes), 1);
    }

    #[test]
    fn delete_of_unknown_item_is_a_noop() {
        let mut replica = PlanReplica::new();
        replica.apply(MutationEvent::Deleted {
            section: PlanSection::Notes,
            item_id: "ghost".into(),
            deleted_by: user("ada@example.com"),
        });
        assert!(replica.is_empty());
    }

    #[test]
    fn budget_is_replaced_wholesale() {
        let mut replica = PlanReplica::new();
        replica.apply(MutationEvent::BudgetSet {
            amount: 500.0,
            set_by: user("ada@example.com"),
        });
        replica.apply(MutationEvent::BudgetSet {
            amount: 700.0,
            set_by: user("bea@example.com"),
        });
        assert_eq!(replica.budget(), 700.0);
    }

    #[test]
    fn resync_converges_divergent_replicas() {
        // Two replicas that saw different frames both adopt the
        // authoritative snapshot and end up identical.
        let mut left = PlanReplica::new();
        left.apply(added(note("n1", "bring sunscreen")));
        left.apply_budget(500.0);

        let mut right = PlanReplica::new();
        right.apply(added(note("n2", "passports")));

        let snapshot = PlanSnapshot {
            notes: vec![note("n3", "check in online")],
            budget: 700.0,
            ..Default::default()
        };
        left.resync(&snapshot);
        right.resync(&snapshot);

        for replica in [&left, &right] {
            assert_eq!(replica.len(PlanSection::Notes), 1);
            assert!(replica.item(PlanSection::Notes, "n3").is_some());
            assert!(replica.item(PlanSection::Notes, "n1").is_none());
            assert_eq!(replica.budget(), 700.0);
        }
    }

    #[test]
    fn event_applied_twice_across_a_resync_equals_once() {
        let snapshot = PlanSnapshot {
            notes: vec![note("n1", "bring sunscreen")],
            ..Default::default()
        };

        // The same add arrives once before the resync and once after
        // (the snapshot already contains it).
        let mut replica = PlanReplica::new();
        let event = added(note("n1", "bring sunscreen"));
        replica.apply(event.clone());
        replica.resync(&snapshot);
        replica.apply(event);

        assert_eq!(replica.len(PlanSection::Notes), 1);
    }
}
