use std::sync::Arc;

use async_trait::async_trait;

use hrdesk_agent::GuardrailDecision;
use hrdesk_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use hrdesk_core::domain::action::{ActionVerb, PendingAction};
use hrdesk_core::errors::ApplicationError;
use hrdesk_core::flows::WorkflowKind;

use crate::render::{Clarification, WorkflowReply};
use crate::services::Services;
use crate::turn::Turn;

use super::{ensure_actor, TextInput, Workflow};

/// Small talk, help and every message no business workflow accepted. Never
/// opens a workflow of its own.
pub struct ChatWorkflow {
    services: Arc<Services>,
}

impl ChatWorkflow {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    fn cancel_operation(
        &self,
        turn: &mut Turn,
        action: &PendingAction,
    ) -> Result<WorkflowReply, ApplicationError> {
        if action.entity_id != turn.state.conversation_id.0 {
            return Err(ApplicationError::Routing(
                "cancel button belongs to another conversation".to_owned(),
            ));
        }
        ensure_actor(turn, &[&action.origin_user])?;

        let abandoned = turn.state.active_workflow;
        turn.state.reset();
        self.services.audit.emit(
            AuditEvent::from_context(
                &turn.audit(),
                "workflow.cancelled",
                AuditCategory::Workflow,
                AuditOutcome::Success,
            )
            .with_metadata("workflow", abandoned.map_or("none", |kind| kind.as_str())),
        );
        Ok(WorkflowReply::text("Okay, I've cancelled that."))
    }
}

#[async_trait]
impl Workflow for ChatWorkflow {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::Chat
    }

    async fn start_turn(
        &self,
        _turn: &mut Turn,
        input: TextInput<'_>,
    ) -> Result<WorkflowReply, ApplicationError> {
        match input.decision {
            GuardrailDecision::Allow => {
                let answer = self.services.responder.reply(input.utterance).await;
                Ok(WorkflowReply::text(answer))
            }
            GuardrailDecision::Deny { user_message, .. }
            | GuardrailDecision::Degrade { user_message, .. } => {
                Ok(WorkflowReply::clarify(Clarification::question(user_message.clone())))
            }
        }
    }

    async fn resume_action(
        &self,
        turn: &mut Turn,
        action: &PendingAction,
        _choice: Option<&str>,
    ) -> Result<WorkflowReply, ApplicationError> {
        match action.verb {
            ActionVerb::CancelOperation => self.cancel_operation(turn, action),
            other => Err(ApplicationError::Routing(format!(
                "`{}` is not a conversation action",
                other.as_str()
            ))),
        }
    }
}
