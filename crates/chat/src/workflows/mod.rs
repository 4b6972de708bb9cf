//! Business workflows. Each one advances the shared collect / propose /
//! decide lifecycle and owns the entities it creates.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use hrdesk_agent::{Classification, GuardrailDecision};
use hrdesk_core::capabilities::NotificationTemplate;
use hrdesk_core::domain::action::{ActionVerb, PendingAction};
use hrdesk_core::domain::employee::EmployeeId;
use hrdesk_core::errors::{ApplicationError, DomainError};
use hrdesk_core::flows::{
    FlowAction, FlowContext, FlowEngine, WorkflowEvent, WorkflowKind, WorkflowStep,
};

use crate::render::{Clarification, OutboundMessage, WorkflowReply};
use crate::services::Services;
use crate::turn::Turn;

pub mod calendar;
pub mod chat;
pub mod onboarding;
pub mod time_off;

pub use calendar::CalendarWorkflow;
pub use chat::ChatWorkflow;
pub use onboarding::OnboardingWorkflow;
pub use time_off::TimeOffWorkflow;

/// A classified free-text message.
#[derive(Clone, Copy, Debug)]
pub struct TextInput<'a> {
    pub utterance: &'a str,
    pub classification: &'a Classification,
    pub decision: &'a GuardrailDecision,
}

#[async_trait]
pub trait Workflow: Send + Sync {
    fn kind(&self) -> WorkflowKind;

    async fn start_turn(
        &self,
        turn: &mut Turn,
        input: TextInput<'_>,
    ) -> Result<WorkflowReply, ApplicationError>;

    /// `choice` carries the index of the picked option on multi-choice cards.
    async fn resume_action(
        &self,
        turn: &mut Turn,
        action: &PendingAction,
        choice: Option<&str>,
    ) -> Result<WorkflowReply, ApplicationError>;
}

pub struct WorkflowSet {
    onboarding: OnboardingWorkflow,
    time_off: TimeOffWorkflow,
    calendar: CalendarWorkflow,
    chat: ChatWorkflow,
}

impl WorkflowSet {
    pub fn new(services: Arc<Services>) -> Self {
        Self {
            onboarding: OnboardingWorkflow::new(Arc::clone(&services)),
            time_off: TimeOffWorkflow::new(Arc::clone(&services)),
            calendar: CalendarWorkflow::new(Arc::clone(&services)),
            chat: ChatWorkflow::new(services),
        }
    }

    pub fn handler(&self, kind: WorkflowKind) -> &dyn Workflow {
        match kind {
            WorkflowKind::Onboarding => &self.onboarding,
            WorkflowKind::TimeOff => &self.time_off,
            WorkflowKind::Calendar => &self.calendar,
            WorkflowKind::Chat => &self.chat,
        }
    }
}

/// Starts `kind` afresh unless the conversation is still collecting for it.
pub(crate) fn open(turn: &mut Turn, kind: WorkflowKind) {
    let continuing = turn.state.active_workflow == Some(kind)
        && turn.state.step == WorkflowStep::Collecting;
    if !continuing {
        turn.state.reset();
    }
}

/// Applies `event` to the conversation's step for `kind` and records the
/// result in the conversation state.
pub(crate) fn advance(
    services: &Services,
    turn: &mut Turn,
    kind: WorkflowKind,
    event: WorkflowEvent,
    missing: &[&str],
) -> Result<WorkflowStep, ApplicationError> {
    let current = if turn.state.active_workflow == Some(kind) {
        turn.state.step
    } else {
        WorkflowStep::Start
    };
    let outcome = FlowEngine::for_kind(kind)
        .apply_with_audit(
            &current,
            &event,
            &FlowContext::missing(missing),
            services.audit.as_ref(),
            &turn.audit(),
        )
        .map_err(DomainError::from)?;

    turn.state.enter(kind, outcome.to);
    if outcome.actions.contains(&FlowAction::ClearScratch) {
        turn.state.scratch.clear();
    }
    Ok(outcome.to)
}

/// Records a decision on an entity. The click may arrive in any
/// conversation; only one that is itself waiting on `kind` moves on.
pub(crate) fn settle(
    services: &Services,
    turn: &mut Turn,
    kind: WorkflowKind,
    entity_id: &str,
    event: WorkflowEvent,
) -> Result<(), ApplicationError> {
    FlowEngine::for_kind(kind)
        .apply_with_audit(
            &WorkflowStep::AwaitingDecision,
            &event,
            &FlowContext::default(),
            services.audit.as_ref(),
            &turn.audit().with_entity(entity_id),
        )
        .map_err(DomainError::from)?;

    if turn.state.active_workflow == Some(kind)
        && turn.state.step == WorkflowStep::AwaitingDecision
    {
        turn.state.reset();
    }
    Ok(())
}

pub(crate) fn issue_token(
    services: &Services,
    turn: &Turn,
    workflow: WorkflowKind,
    entity_id: &str,
    verb: ActionVerb,
) -> String {
    let action = services.tokens.issue(workflow, entity_id, verb, &turn.actor.id, turn.now);
    services.tokens.encode(&action)
}

/// Follow-up question with a cancel button bound to this conversation.
pub(crate) fn ask(
    services: &Services,
    turn: &mut Turn,
    question: impl Into<String>,
) -> WorkflowReply {
    let conversation = turn.state.conversation_id.0.clone();
    let token =
        issue_token(services, turn, WorkflowKind::Chat, &conversation, ActionVerb::CancelOperation);
    turn.state.record_pending_actions([token.clone()]);
    WorkflowReply::clarify(Clarification::question(question).with_cancel(token))
}

/// Only the person an action was issued to, or `allowed`, may resolve it.
pub(crate) fn ensure_actor(turn: &Turn, allowed: &[&EmployeeId]) -> Result<(), ApplicationError> {
    if allowed.iter().any(|id| **id == turn.actor.id) {
        return Ok(());
    }
    Err(ApplicationError::Authorization(
        "You are not allowed to decide on this request.".to_owned(),
    ))
}

/// Email delivery never fails the turn; a miss becomes a warning.
pub(crate) async fn notify(
    services: &Services,
    reply: &mut WorkflowReply,
    recipient: &str,
    template: NotificationTemplate,
    data: Value,
) {
    if let Err(error) = services.capabilities.notifier.send(recipient, template, data).await {
        warn!(
            event_name = "notification.send.failed",
            template = template.as_str(),
            error = %error,
            "notification was not delivered"
        );
        reply.warn(format!("The {} email could not be sent.", template_label(template)));
    }
}

/// Proactive chat message to someone other than the current speaker.
pub(crate) async fn deliver(
    services: &Services,
    reply: &mut WorkflowReply,
    recipient: &EmployeeId,
    message: &OutboundMessage,
) {
    if let Err(error) = services.capabilities.transport.deliver(recipient, message).await {
        warn!(
            event_name = "transport.deliver.failed",
            recipient = recipient.as_str(),
            error = %error,
            "proactive message was not delivered"
        );
        reply.warn(format!("{} could not be notified in chat.", recipient.as_str()));
    }
}

fn template_label(template: NotificationTemplate) -> &'static str {
    match template {
        NotificationTemplate::WelcomeEmail => "welcome",
        NotificationTemplate::LeaveSubmitted => "request",
        NotificationTemplate::LeaveDecision => "decision",
        NotificationTemplate::MeetingBooked => "invitation",
    }
}
