use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::flows::states::{
    FlowAction, FlowContext, TransitionOutcome, WorkflowEvent, WorkflowKind, WorkflowStep,
};

pub trait FlowDefinition {
    fn kind(&self) -> WorkflowKind;
    fn initial_step(&self) -> WorkflowStep;
    fn transition(
        &self,
        current: &WorkflowStep,
        event: &WorkflowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// The collect / propose / decide lifecycle shared by every business
/// workflow.
#[derive(Clone, Copy, Debug)]
pub struct StagedFlow {
    kind: WorkflowKind,
}

impl StagedFlow {
    pub fn new(kind: WorkflowKind) -> Self {
        Self { kind }
    }
}

impl FlowDefinition for StagedFlow {
    fn kind(&self) -> WorkflowKind {
        self.kind
    }

    fn initial_step(&self) -> WorkflowStep {
        WorkflowStep::Start
    }

    fn transition(
        &self,
        current: &WorkflowStep,
        event: &WorkflowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_staged(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn kind(&self) -> WorkflowKind {
        self.flow.kind()
    }

    pub fn initial_step(&self) -> WorkflowStep {
        self.flow.initial_step()
    }

    pub fn apply(
        &self,
        current: &WorkflowStep,
        event: &WorkflowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &WorkflowStep,
        event: &WorkflowEvent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "workflow.transition_applied",
                        AuditCategory::Workflow,
                        AuditOutcome::Success,
                    )
                    .with_metadata("workflow", self.kind().as_str())
                    .with_metadata("from", format!("{:?}", outcome.from))
                    .with_metadata("to", format!("{:?}", outcome.to))
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "workflow.transition_rejected",
                        AuditCategory::Workflow,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("workflow", self.kind().as_str())
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl FlowEngine<StagedFlow> {
    pub fn for_kind(kind: WorkflowKind) -> Self {
        Self::new(StagedFlow::new(kind))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("missing required slots before transition from {step:?}: {missing_slots:?}")]
    MissingRequiredSlots { step: WorkflowStep, missing_slots: Vec<String> },
    #[error("invalid transition from {step:?} using event {event:?}")]
    InvalidTransition { step: WorkflowStep, event: WorkflowEvent },
}

fn transition_staged(
    current: &WorkflowStep,
    event: &WorkflowEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use FlowAction::{
        ApplySideEffects, AskFollowUp, ClearScratch, ExplainRejection, IssuePendingActions,
        ValidateProposal,
    };
    use WorkflowEvent::{
        Answered, DecisionApplied, DecisionDeclined, ProposalIssued, Restart, SlotsComplete,
        SlotsMissing, ValidationFailed,
    };
    use WorkflowStep::{AwaitingDecision, Collecting, Proposing, Resolved, Start};

    let (to, actions) = match (current, event) {
        (Start, SlotsMissing) | (Collecting, SlotsMissing) => (Collecting, vec![AskFollowUp]),
        (Start, SlotsComplete) | (Collecting, SlotsComplete) => {
            if !context.missing_slots.is_empty() {
                return Err(FlowTransitionError::MissingRequiredSlots {
                    step: *current,
                    missing_slots: context.missing_slots.clone(),
                });
            }
            (Proposing, vec![ValidateProposal])
        }
        (Start, Answered) | (Collecting, Answered) => (Resolved, vec![ClearScratch]),
        (Proposing, ValidationFailed) => (Collecting, vec![ExplainRejection]),
        (Proposing, ProposalIssued) => (AwaitingDecision, vec![IssuePendingActions, ClearScratch]),
        (AwaitingDecision, DecisionApplied) => (Resolved, vec![ApplySideEffects]),
        (AwaitingDecision, DecisionDeclined) => (Resolved, Vec::new()),
        (_, Restart) => (Start, vec![ClearScratch]),
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                step: *current,
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: event.clone(), actions })
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::flows::engine::{FlowEngine, FlowTransitionError};
    use crate::flows::states::{
        FlowAction, FlowContext, WorkflowEvent, WorkflowKind, WorkflowStep,
    };

    #[test]
    fn happy_path_reaches_resolved() {
        let engine = FlowEngine::for_kind(WorkflowKind::TimeOff);
        let context = FlowContext::default();
        let mut step = engine.initial_step();

        step = engine
            .apply(&step, &WorkflowEvent::SlotsComplete, &context)
            .expect("start -> proposing")
            .to;
        assert_eq!(step, WorkflowStep::Proposing);

        let issued = engine
            .apply(&step, &WorkflowEvent::ProposalIssued, &context)
            .expect("proposing -> awaiting decision");
        assert_eq!(issued.to, WorkflowStep::AwaitingDecision);
        assert!(issued.actions.contains(&FlowAction::IssuePendingActions));

        let resolved = engine
            .apply(&issued.to, &WorkflowEvent::DecisionApplied, &context)
            .expect("awaiting -> resolved");
        assert_eq!(resolved.to, WorkflowStep::Resolved);
        assert_eq!(resolved.actions, vec![FlowAction::ApplySideEffects]);
    }

    #[test]
    fn missing_slots_keep_the_flow_collecting() {
        let engine = FlowEngine::for_kind(WorkflowKind::Onboarding);
        let outcome = engine
            .apply(
                &WorkflowStep::Start,
                &WorkflowEvent::SlotsMissing,
                &FlowContext::missing(&["email"]),
            )
            .expect("start -> collecting");
        assert_eq!(outcome.to, WorkflowStep::Collecting);
        assert_eq!(outcome.actions, vec![FlowAction::AskFollowUp]);

        let error = engine
            .apply(
                &WorkflowStep::Collecting,
                &WorkflowEvent::SlotsComplete,
                &FlowContext::missing(&["email"]),
            )
            .expect_err("slots are still missing");
        assert!(matches!(error, FlowTransitionError::MissingRequiredSlots { .. }));
    }

    #[test]
    fn validation_failure_returns_to_collecting() {
        let engine = FlowEngine::for_kind(WorkflowKind::TimeOff);
        let outcome = engine
            .apply(
                &WorkflowStep::Proposing,
                &WorkflowEvent::ValidationFailed,
                &FlowContext::default(),
            )
            .expect("proposing -> collecting");
        assert_eq!(outcome.to, WorkflowStep::Collecting);
        assert_eq!(outcome.actions, vec![FlowAction::ExplainRejection]);
    }

    #[test]
    fn resolved_flow_accepts_only_restart() {
        let engine = FlowEngine::for_kind(WorkflowKind::Calendar);
        let error = engine
            .apply(
                &WorkflowStep::Resolved,
                &WorkflowEvent::DecisionApplied,
                &FlowContext::default(),
            )
            .expect_err("resolved is terminal");
        assert!(matches!(
            error,
            FlowTransitionError::InvalidTransition { step: WorkflowStep::Resolved, .. }
        ));

        let restart = engine
            .apply(&WorkflowStep::Resolved, &WorkflowEvent::Restart, &FlowContext::default())
            .expect("restart");
        assert_eq!(restart.to, WorkflowStep::Start);
    }

    #[test]
    fn audited_transitions_record_success_and_rejection() {
        let engine = FlowEngine::for_kind(WorkflowKind::TimeOff);
        let sink = InMemoryAuditSink::default();
        let audit = AuditContext::new("req-1", "emp-1");

        engine
            .apply_with_audit(
                &WorkflowStep::Start,
                &WorkflowEvent::SlotsComplete,
                &FlowContext::default(),
                &sink,
                &audit,
            )
            .expect("start -> proposing");
        let _ = engine.apply_with_audit(
            &WorkflowStep::Start,
            &WorkflowEvent::DecisionApplied,
            &FlowContext::default(),
            &sink,
            &audit,
        );

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "workflow.transition_applied");
        assert_eq!(events[1].event_type, "workflow.transition_rejected");
        assert_eq!(events[0].metadata.get("workflow").map(String::as_str), Some("time_off"));
    }
}
