//! Plan sections, items, snapshots, and mutation events.
//!
//! A trip plan is a set of per-section collections (notes, transits,
//! itineraries, expenses, places) plus one scalar (budget). Items are
//! keyed by a stable string id, unique within (trip, section); that key
//! is what makes client-side reconciliation idempotent.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Timestamp, TripId, UserRef};

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// The closed set of plan sections.
///
/// Everything except `Budget` is a collection of [`PlanItem`]s; `Budget`
/// is a singleton scalar and only supports the update operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanSection {
    Notes,
    Transits,
    Itineraries,
    Expenses,
    Places,
    Budget,
}

/// All collection sections, in snapshot order.
pub const COLLECTION_SECTIONS: [PlanSection; 5] = [
    PlanSection::Notes,
    PlanSection::Transits,
    PlanSection::Itineraries,
    PlanSection::Expenses,
    PlanSection::Places,
];

impl PlanSection {
    /// `true` for every section except the budget scalar.
    pub fn is_collection(self) -> bool {
        !matches!(self, PlanSection::Budget)
    }

    /// Wire / storage name for the section.
    pub fn as_str(self) -> &'static str {
        match self {
            PlanSection::Notes => "notes",
            PlanSection::Transits => "transits",
            PlanSection::Itineraries => "itineraries",
            PlanSection::Expenses => "expenses",
            PlanSection::Places => "places",
            PlanSection::Budget => "budget",
        }
    }

    /// Parse a storage name back into a section.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "notes" => Some(PlanSection::Notes),
            "transits" => Some(PlanSection::Transits),
            "itineraries" => Some(PlanSection::Itineraries),
            "expenses" => Some(PlanSection::Expenses),
            "places" => Some(PlanSection::Places),
            "budget" => Some(PlanSection::Budget),
            _ => None,
        }
    }
}

impl std::fmt::Display for PlanSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// The unit of mutation: one entry in a collection section.
///
/// Invariant: within a trip, (section, id) identifies at most one live
/// item. Deletion removes it permanently; the core keeps no tombstones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanItem {
    pub id: String,
    pub section: PlanSection,
    /// Section-specific structured content (validated on ingest, stored
    /// as-is).
    pub payload: Value,
    pub created_by: UserRef,
    pub updated_by: Option<UserRef>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl PlanItem {
    /// Build a fresh item on behalf of `actor`. Timestamps are set to
    /// now; the store may replace them with its own canonical values.
    pub fn new(id: String, section: PlanSection, payload: Value, actor: UserRef) -> Self {
        let now = chrono::Utc::now();
        Self {
            id,
            section,
            payload,
            created_by: actor,
            updated_by: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Full authoritative plan state for one trip.
///
/// Used for the join confirmation and for resync after reconnect. The
/// client replaces its state wholesale with one of these rather than
/// replaying missed deltas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    pub notes: Vec<PlanItem>,
    pub transits: Vec<PlanItem>,
    pub itineraries: Vec<PlanItem>,
    pub expenses: Vec<PlanItem>,
    pub places: Vec<PlanItem>,
    pub budget: f64,
}

impl PlanSnapshot {
    /// Items of one collection section; `None` for `Budget`.
    pub fn items(&self, section: PlanSection) -> Option<&Vec<PlanItem>> {
        match section {
            PlanSection::Notes => Some(&self.notes),
            PlanSection::Transits => Some(&self.transits),
            PlanSection::Itineraries => Some(&self.itineraries),
            PlanSection::Expenses => Some(&self.expenses),
            PlanSection::Places => Some(&self.places),
            PlanSection::Budget => None,
        }
    }

    /// Mutable access used by storage adapters when assembling a
    /// snapshot section by section.
    pub fn items_mut(&mut self, section: PlanSection) -> Option<&mut Vec<PlanItem>> {
        match section {
            PlanSection::Notes => Some(&mut self.notes),
            PlanSection::Transits => Some(&mut self.transits),
            PlanSection::Itineraries => Some(&mut self.itineraries),
            PlanSection::Expenses => Some(&mut self.expenses),
            PlanSection::Places => Some(&mut self.places),
            PlanSection::Budget => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Mutation events
// ---------------------------------------------------------------------------

/// The unit of broadcast: a mutation that was durably applied to the
/// plan store. The core never constructs one of these for speculative
/// state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationEvent {
    Added {
        section: PlanSection,
        item: PlanItem,
        added_by: UserRef,
    },
    Updated {
        section: PlanSection,
        item: PlanItem,
        updated_by: UserRef,
    },
    Deleted {
        section: PlanSection,
        item_id: String,
        deleted_by: UserRef,
    },
    BudgetSet {
        amount: f64,
        set_by: UserRef,
    },
}

// ---------------------------------------------------------------------------
// Invites
// ---------------------------------------------------------------------------

/// Claims carried by a validated invite token.
///
/// Minted by the trip owner through the platform (out of scope here);
/// consumed by the identity resolver to grant one-time membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvitePass {
    pub trip_id: TripId,
    pub email: String,
    pub expires_at: Timestamp,
}

impl InvitePass {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }
}

// ---------------------------------------------------------------------------
// Payload validation
// ---------------------------------------------------------------------------

// Typed shapes the raw JSON payloads must deserialize into on `add`.
// Updates are partial, so they are only checked to be non-empty objects.

#[derive(Deserialize)]
struct NotePayload {
    text: String,
}

#[derive(Deserialize)]
struct TransitPayload {
    mode: String,
    from: String,
    to: String,
}

#[derive(Deserialize)]
struct ItineraryPayload {
    place: String,
}

#[derive(Deserialize)]
struct ExpensePayload {
    title: String,
    amount: f64,
}

#[derive(Deserialize)]
struct PlacePayload {
    name: String,
}

fn require_nonempty(field: &'static str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("'{field}' must not be empty"));
    }
    Ok(())
}

fn require_amount(field: &'static str, value: f64) -> Result<(), String> {
    if !value.is_finite() {
        return Err(format!("'{field}' must be a finite number"));
    }
    if value < 0.0 {
        return Err(format!("'{field}' must not be negative, got {value}"));
    }
    Ok(())
}

/// Validate a payload for `add` against its declared section.
pub fn validate_new_payload(section: PlanSection, payload: &Value) -> Result<(), String> {
    match section {
        PlanSection::Notes => {
            let p: NotePayload = from_value(section, payload)?;
            require_nonempty("text", &p.text)
        }
        PlanSection::Transits => {
            let p: TransitPayload = from_value(section, payload)?;
            require_nonempty("mode", &p.mode)?;
            require_nonempty("from", &p.from)?;
            require_nonempty("to", &p.to)
        }
        PlanSection::Itineraries => {
            let p: ItineraryPayload = from_value(section, payload)?;
            require_nonempty("place", &p.place)
        }
        PlanSection::Expenses => {
            let p: ExpensePayload = from_value(section, payload)?;
            require_nonempty("title", &p.title)?;
            require_amount("amount", p.amount)
        }
        PlanSection::Places => {
            let p: PlacePayload = from_value(section, payload)?;
            require_nonempty("name", &p.name)
        }
        PlanSection::Budget => Err("budget is a scalar, not a collection".into()),
    }
}

fn from_value<T: serde::de::DeserializeOwned>(
    section: PlanSection,
    payload: &Value,
) -> Result<T, String> {
    serde_json::from_value(payload.clone())
        .map_err(|e| format!("malformed {section} payload: {e}"))
}

/// Validate a payload for `update`: partial, but must be a non-empty
/// JSON object so the merge has something to do.
pub fn validate_update_payload(payload: &Value) -> Result<(), String> {
    match payload.as_object() {
        Some(map) if !map.is_empty() => Ok(()),
        Some(_) => Err("update payload must not be empty".into()),
        None => Err("update payload must be a JSON object".into()),
    }
}

/// Validate and extract the budget amount from a raw payload (a bare
/// JSON number).
pub fn validate_budget_amount(payload: &Value) -> Result<f64, String> {
    let amount = payload
        .as_f64()
        .ok_or_else(|| "budget payload must be a number".to_string())?;
    require_amount("budget", amount)?;
    Ok(amount)
}

/// Shallow-merge an update payload into an existing one.
///
/// Section payloads are flat objects, so top-level key replacement is
/// the whole contract; nested merge semantics are deliberately not
/// promised.
pub fn merge_payload(existing: &mut Value, patch: &Value) {
    match (existing.as_object_mut(), patch.as_object()) {
        (Some(base), Some(overlay)) => {
            for (key, value) in overlay {
                base.insert(key.clone(), value.clone());
            }
        }
        _ => *existing = patch.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
