pub mod engine;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError, StagedFlow};
pub use states::{
    FlowAction, FlowContext, TransitionOutcome, WorkflowEvent, WorkflowKind, WorkflowStep,
};
