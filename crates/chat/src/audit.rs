use tracing::{info, warn};

use hrdesk_core::audit::{AuditEvent, AuditOutcome, AuditSink};

/// Audit sink that writes each event as a structured log line.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();

        if event.outcome == AuditOutcome::Success {
            info!(
                event_name = %event.event_type,
                correlation_id = %event.context.correlation_id,
                conversation_id = event.conversation(),
                entity_id = event.entity(),
                actor = %event.context.actor,
                category = event.category.as_str(),
                metadata = %metadata,
                "audit"
            );
        } else {
            warn!(
                event_name = %event.event_type,
                correlation_id = %event.context.correlation_id,
                conversation_id = event.conversation(),
                entity_id = event.entity(),
                actor = %event.context.actor,
                category = event.category.as_str(),
                outcome = ?event.outcome,
                metadata = %metadata,
                "audit"
            );
        }
    }
}
