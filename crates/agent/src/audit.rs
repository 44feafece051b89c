use netops_core::audit::{AuditEvent, AuditSink};
use tracing::{info, warn};

/// Writes audit records into the process log; refused and failed records log at warn.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let session = event.session_id().map_or("-", |id| id.as_str());
        let capability = event.capability_id().unwrap_or("-");
        let details = serde_json::to_string(&event.details).unwrap_or_default();

        if event.outcome.is_accepted() {
            info!(
                event_name = %event.action,
                category = ?event.category,
                correlation_id = %event.context.correlation_id,
                session_id = session,
                capability_id = capability,
                actor = %event.context.actor,
                details = %details,
                "audit"
            );
        } else {
            warn!(
                event_name = %event.action,
                category = ?event.category,
                outcome = ?event.outcome,
                correlation_id = %event.context.correlation_id,
                session_id = session,
                capability_id = capability,
                actor = %event.context.actor,
                details = %details,
                "audit"
            );
        }
    }
}
