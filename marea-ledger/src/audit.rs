//! Audit collaborator
//!
//! Every entity written by a committed unit of work produces one
//! [`AuditEvent`]. Events are handed to an [`AuditSink`] only after the
//! RocksDB batch is durable, so a rejected operation never notifies.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// What happened to the entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    /// New entity
    Insert,
    /// Field update or supersession
    Update,
    /// Lifecycle transition
    StateChange,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AuditAction::Insert => "insert",
            AuditAction::Update => "update",
            AuditAction::StateChange => "state_change",
        };
        f.write_str(label)
    }
}

/// Audit payload staged inside a transaction, before the acting user is attached
#[derive(Debug, Clone)]
pub struct PendingAudit {
    pub(crate) entity_type: &'static str,
    pub(crate) action: AuditAction,
    pub(crate) detail: String,
    pub(crate) snapshot: serde_json::Value,
}

/// Post-commit notification for one written entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Time-ordered event id
    pub event_id: Uuid,
    /// Entity kind (`trip`, `quota_entry`, ...)
    pub entity_type: String,
    /// Action performed
    pub action: AuditAction,
    /// Human-readable detail
    pub detail: String,
    /// Acting user
    pub user_id: String,
    /// Entity as written
    pub snapshot: serde_json::Value,
    /// Commit time
    pub recorded_at: DateTime<Utc>,
}

impl AuditEvent {
    pub(crate) fn from_pending(pending: PendingAudit, user_id: &str) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            entity_type: pending.entity_type.to_string(),
            action: pending.action,
            detail: pending.detail,
            user_id: user_id.to_string(),
            snapshot: pending.snapshot,
            recorded_at: Utc::now(),
        }
    }
}

/// Receiver of committed audit events
pub trait AuditSink: Send + Sync + 'static {
    /// Record one event. Must not block the ledger for long.
    fn record(&self, event: &AuditEvent);
}

/// Writes audit events to the `marea::audit` tracing target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        tracing::info!(
            target: "marea::audit",
            event_id = %event.event_id,
            entity_type = %event.entity_type,
            action = %event.action,
            user_id = %event.user_id,
            snapshot = %event.snapshot,
            "{}",
            event.detail
        );
    }
}

/// Keeps audit events in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every event recorded so far
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    /// Number of recorded events
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// True if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> PendingAudit {
        PendingAudit {
            entity_type: "trip",
            action: AuditAction::Insert,
            detail: "Created trip M-B01-202401".to_string(),
            snapshot: serde_json::json!({ "trip_id": "M-B01-202401" }),
        }
    }

    #[test]
    fn test_event_carries_user() {
        let event = AuditEvent::from_pending(pending(), "jdoe");
        assert_eq!(event.user_id, "jdoe");
        assert_eq!(event.entity_type, "trip");
        assert_eq!(event.snapshot["trip_id"], "M-B01-202401");
    }

    #[test]
    fn test_memory_sink_records() {
        let sink = MemoryAuditSink::new();
        assert!(sink.is_empty());

        sink.record(&AuditEvent::from_pending(pending(), "jdoe"));
        sink.record(&AuditEvent::from_pending(pending(), "mrossi"));

        let events = sink.events();
        assert_eq!(sink.len(), 2);
        assert_eq!(events[1].user_id, "mrossi");
        assert_ne!(events[0].event_id, events[1].event_id);
    }
}
