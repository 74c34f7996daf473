//! Trigger data structures.
//!
//! A trigger is a one-shot notification task: a deterministic identity, an
//! absolute fire time, and the message text frozen at scheduling time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a trigger.
pub type TriggerId = String;

/// A pending one-shot notification.
///
/// This is the only persisted record in the system: one YAML file per
/// trigger. The payload is computed when the trigger is created and never
/// recomputed, so formatting changes don't touch already-scheduled messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    /// Deterministic identifier, `{session_id}_{kind}`.
    pub id: TriggerId,
    /// When to fire (UTC).
    pub fire_at: DateTime<Utc>,
    /// Frozen message text delivered at fire time.
    pub payload: String,
}

impl Trigger {
    /// Derive the identifier for a session/kind pair.
    ///
    /// The same inputs always produce the same id, which is what makes
    /// re-scheduling idempotent: a second upsert lands on the same record.
    pub fn id_for(session_id: &str, kind: TriggerKind) -> TriggerId {
        format!("{}_{}", session_id, kind.tag())
    }
}

/// Which of a session's two notifications a trigger carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// Advance warning, `lead_hours` before the session starts.
    Lead,
    /// Session start.
    Start,
}

impl TriggerKind {
    /// Tag used in trigger ids.
    pub fn tag(&self) -> &'static str {
        match self {
            TriggerKind::Lead => "LEAD",
            TriggerKind::Start => "START",
        }
    }
}
