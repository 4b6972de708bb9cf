//! Audit trail for HR decisions.
//!
//! Every state change a user can be held accountable for (a leave request
//! submitted, an approval applied, an account provisioned) produces one
//! [`AuditEvent`]. Events are handed to an [`AuditSink`]; the server logs
//! them, tests collect them in memory.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::conversation::ConversationId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Ingress,
    Workflow,
    Action,
    Capability,
    Persistence,
    System,
}

impl AuditCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ingress => "ingress",
            Self::Workflow => "workflow",
            Self::Action => "action",
            Self::Capability => "capability",
            Self::Persistence => "persistence",
            Self::System => "system",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    /// The request was understood but refused (wrong approver, stale card).
    Rejected,
    /// A downstream system failed while carrying the request out.
    Failed,
}

/// Who acted, in which conversation, on which record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub correlation_id: String,
    pub actor: String,
    pub conversation_id: Option<ConversationId>,
    pub entity_id: Option<String>,
}

impl AuditContext {
    pub fn new(correlation_id: impl Into<String>, actor: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            actor: actor.into(),
            conversation_id: None,
            entity_id: None,
        }
    }

    pub fn in_conversation(mut self, conversation_id: ConversationId) -> Self {
        self.conversation_id = Some(conversation_id);
        self
    }

    /// Narrows the context to one leave request, meeting or onboarding record.
    pub fn with_entity(&self, entity_id: impl Into<String>) -> Self {
        Self { entity_id: Some(entity_id.into()), ..self.clone() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub event_type: String,
    pub category: AuditCategory,
    pub outcome: AuditOutcome,
    #[serde(flatten)]
    pub context: AuditContext,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn from_context(
        context: &AuditContext,
        event_type: impl Into<String>,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            category,
            outcome,
            context: context.clone(),
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn conversation(&self) -> &str {
        self.context.conversation_id.as_ref().map_or("", |id| id.0.as_str())
    }

    pub fn entity(&self) -> &str {
        self.context.entity_id.as_deref().unwrap_or_default()
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

/// Collects events for assertions.
#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    pub fn count(&self, event_type: &str) -> usize {
        self.events().iter().filter(|event| event.event_type == event_type).count()
    }

    /// Events recorded against one leave request, meeting or onboarding record.
    pub fn for_entity(&self, entity_id: &str) -> Vec<AuditEvent> {
        self.events().into_iter().filter(|event| event.entity() == entity_id).collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(event);
    }
}
