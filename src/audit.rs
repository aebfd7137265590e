//! Audit events for registry mutations
//!
//! Fire-and-forget: a sink cannot fail the operation that produced the event.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Registry mutation being audited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Submit,
    Evaluate,
    Activate,
    Deactivate,
    Delete,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuditAction::Submit => "submit",
            AuditAction::Evaluate => "evaluate",
            AuditAction::Activate => "activate",
            AuditAction::Deactivate => "deactivate",
            AuditAction::Delete => "delete",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub version: String,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    /// `ok`, an error kind, or a flagged condition such as `no_active_version`
    pub outcome: String,
}

impl AuditEvent {
    pub fn new(action: AuditAction, version: impl Into<String>, actor: impl Into<String>, outcome: impl Into<String>) -> Self {
        Self {
            action,
            version: version.into(),
            actor: actor.into(),
            timestamp: Utc::now(),
            outcome: outcome.into(),
        }
    }
}

/// Receiver of audit events
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Writes audit events as `tracing` events on the `exchange_schemas::audit` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        info!(
            target: "exchange_schemas::audit",
            action = %event.action,
            version = %event.version,
            actor = %event.actor,
            timestamp = %event.timestamp.to_rfc3339(),
            outcome = %event.outcome,
            "audit"
        );
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Sink that keeps every event for assertions
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub events: Mutex<Vec<AuditEvent>>,
    }

    impl AuditSink for RecordingSink {
        fn record(&self, event: AuditEvent) {
            self.events.lock().push(event);
        }
    }

    #[test]
    fn test_event_fields() {
        let sink = RecordingSink::default();
        sink.record(AuditEvent::new(AuditAction::Activate, "1.0.0", "ops", "ok"));
        TracingAuditSink.record(AuditEvent::new(AuditAction::Delete, "1.0.0", "ops", "conflict"));

        let events = sink.events.lock();
        assert_eq!(events[0].action, AuditAction::Activate);
        assert_eq!(events[0].outcome, "ok");
        assert_eq!(events[0].action.to_string(), "activate");
    }
}
