use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Onboarding,
    TimeOff,
    Calendar,
    Chat,
}

impl WorkflowKind {
    pub const ALL: [WorkflowKind; 4] =
        [Self::Onboarding, Self::TimeOff, Self::Calendar, Self::Chat];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Onboarding => "onboarding",
            Self::TimeOff => "time_off",
            Self::Calendar => "calendar",
            Self::Chat => "chat",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "onboarding" => Some(Self::Onboarding),
            "time_off" => Some(Self::TimeOff),
            "calendar" => Some(Self::Calendar),
            "chat" => Some(Self::Chat),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    #[default]
    Start,
    Collecting,
    Proposing,
    AwaitingDecision,
    Resolved,
}

impl WorkflowStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Collecting => "collecting",
            Self::Proposing => "proposing",
            Self::AwaitingDecision => "awaiting_decision",
            Self::Resolved => "resolved",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "start" => Some(Self::Start),
            "collecting" => Some(Self::Collecting),
            "proposing" => Some(Self::Proposing),
            "awaiting_decision" => Some(Self::AwaitingDecision),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowEvent {
    SlotsMissing,
    SlotsComplete,
    ValidationFailed,
    ProposalIssued,
    Answered,
    DecisionApplied,
    DecisionDeclined,
    Restart,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowContext {
    pub missing_slots: Vec<String>,
}

impl FlowContext {
    pub fn missing(slots: &[&str]) -> Self {
        Self { missing_slots: slots.iter().map(|slot| (*slot).to_owned()).collect() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    AskFollowUp,
    ValidateProposal,
    ExplainRejection,
    IssuePendingActions,
    ApplySideEffects,
    ClearScratch,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: WorkflowStep,
    pub to: WorkflowStep,
    pub event: WorkflowEvent,
    pub actions: Vec<FlowAction>,
}
