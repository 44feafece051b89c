//! Audit trail for operator turns, flow transitions and dispatches.
//!
//! Every record is cut from an [`AuditContext`], so the session, the capability
//! and the correlation id shared with the structured logs travel together.
//! Details under credential-like keys are masked as they are attached; a sink
//! never sees a password or API key.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::conversation::SessionId;

const MASK: &str = "<redacted>";
const CREDENTIAL_MARKERS: [&str; 4] = ["password", "secret", "api_key", "token"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    /// An operator message reached the service.
    Turn,
    Flow,
    Dispatch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Accepted,
    Refused,
    Failed,
}

impl AuditOutcome {
    pub fn is_accepted(self) -> bool {
        self == Self::Accepted
    }
}

/// Who and what a turn is about. Cloned into each record the turn produces.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub session_id: Option<SessionId>,
    pub capability_id: Option<String>,
    pub correlation_id: String,
    pub actor: String,
}

impl AuditContext {
    pub fn new(
        session_id: Option<SessionId>,
        capability_id: Option<String>,
        correlation_id: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self { session_id, capability_id, correlation_id: correlation_id.into(), actor: actor.into() }
    }

    /// Starts a record of `action` (e.g. `dispatch.execution_started`) for this turn.
    pub fn record(&self, action: &str, category: AuditCategory, outcome: AuditOutcome) -> AuditEvent {
        AuditEvent {
            id: Uuid::new_v4(),
            context: self.clone(),
            action: action.to_owned(),
            category,
            outcome,
            details: BTreeMap::new(),
            recorded_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    #[serde(flatten)]
    pub context: AuditContext,
    pub action: String,
    pub category: AuditCategory,
    pub outcome: AuditOutcome,
    pub details: BTreeMap<String, String>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn detail(mut self, key: &str, value: impl Into<String>) -> Self {
        let masked = is_credential(key);
        self.details.insert(key.to_owned(), if masked { MASK.to_owned() } else { value.into() });
        self
    }

    pub fn detail_value(&self, key: &str) -> Option<&str> {
        self.details.get(key).map(String::as_str)
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.context.session_id.as_ref()
    }

    pub fn capability_id(&self) -> Option<&str> {
        self.context.capability_id.as_deref()
    }
}

fn is_credential(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    CREDENTIAL_MARKERS.iter().any(|marker| key.contains(marker))
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

/// Holds records in memory so a caller can inspect what a turn did.
#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    recorded: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    fn guard(&self) -> MutexGuard<'_, Vec<AuditEvent>> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> Vec<AuditEvent> {
        self.guard().clone()
    }

    pub fn count_of(&self, action: &str) -> usize {
        self.guard().iter().filter(|event| event.action == action).count()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        self.guard().push(event);
    }
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink, InMemoryAuditSink};
    use crate::domain::conversation::SessionId;

    fn turn() -> AuditContext {
        AuditContext::new(
            Some(SessionId("ops-desk-1".to_owned())),
            Some("aclRemoval-main".to_owned()),
            "corr-7f3a",
            "conversation",
        )
    }

    #[test]
    fn records_inherit_the_turn_context() {
        let sink = InMemoryAuditSink::default();
        sink.emit(
            turn()
                .record("flow.transition_applied", AuditCategory::Flow, AuditOutcome::Accepted)
                .detail("from", "awaiting_confirmation")
                .detail("to", "dispatched"),
        );
        sink.emit(turn().record("dispatch.execution_refused", AuditCategory::Dispatch, AuditOutcome::Refused));

        let recorded = sink.snapshot();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].context.correlation_id, "corr-7f3a");
        assert_eq!(recorded[0].session_id().map(SessionId::as_str), Some("ops-desk-1"));
        assert_eq!(recorded[0].capability_id(), Some("aclRemoval-main"));
        assert_eq!(recorded[0].detail_value("to"), Some("dispatched"));
        assert_ne!(recorded[0].id, recorded[1].id);
        assert!(!recorded[1].outcome.is_accepted());
        assert_eq!(sink.count_of("dispatch.execution_refused"), 1);
    }

    #[test]
    fn credential_like_details_are_masked() {
        let record = turn()
            .record("dispatch.execution_started", AuditCategory::Dispatch, AuditOutcome::Accepted)
            .detail("password", "hunter2")
            .detail("LLM_API_KEY", "sk-123")
            .detail("devices", "10.0.0.1");

        assert_eq!(record.detail_value("password"), Some("<redacted>"));
        assert_eq!(record.detail_value("LLM_API_KEY"), Some("<redacted>"));
        assert_eq!(record.detail_value("devices"), Some("10.0.0.1"));
    }

    #[test]
    fn serialized_records_are_flat() {
        let record = turn().record("conversation.turn_received", AuditCategory::Turn, AuditOutcome::Accepted);
        let json = serde_json::to_value(&record).expect("serialize");

        assert_eq!(json["correlation_id"], "corr-7f3a");
        assert_eq!(json["session_id"], "ops-desk-1");
        assert_eq!(json["category"], "turn");
        assert_eq!(json["outcome"], "accepted");
        assert!(json.get("context").is_none());
    }
}
