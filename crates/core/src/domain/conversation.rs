use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::FailureKind;
use crate::flows::{WorkflowKind, WorkflowStep};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

/// Dialog state of one conversation. Read before every turn and written back
/// exactly once when the turn ends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub conversation_id: ConversationId,
    pub active_workflow: Option<WorkflowKind>,
    pub step: WorkflowStep,
    pub pending_actions: Vec<String>,
    pub scratch: BTreeMap<String, serde_json::Value>,
    pub turn_count: u64,
    pub last_failure: Option<FailureKind>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            active_workflow: None,
            step: WorkflowStep::Start,
            pending_actions: Vec::new(),
            scratch: BTreeMap::new(),
            turn_count: 0,
            last_failure: None,
            updated_at: Utc::now(),
        }
    }

    /// True while a workflow waits for more input from this conversation.
    pub fn is_collecting(&self) -> bool {
        self.active_workflow.is_some() && self.step == WorkflowStep::Collecting
    }

    pub fn enter(&mut self, workflow: WorkflowKind, step: WorkflowStep) {
        if self.active_workflow != Some(workflow) {
            self.scratch.clear();
        }
        self.active_workflow = Some(workflow);
        self.step = step;
    }

    pub fn reset(&mut self) {
        self.active_workflow = None;
        self.step = WorkflowStep::Start;
        self.scratch.clear();
    }

    pub fn put_scratch<T: Serialize>(&mut self, key: &str, value: &T) {
        if let Ok(value) = serde_json::to_value(value) {
            self.scratch.insert(key.to_owned(), value);
        }
    }

    pub fn scratch<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.scratch.get(key).and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn record_pending_actions(&mut self, tokens: impl IntoIterator<Item = String>) {
        self.pending_actions.extend(tokens);
        let overflow = self.pending_actions.len().saturating_sub(MAX_TRACKED_ACTIONS);
        if overflow > 0 {
            self.pending_actions.drain(..overflow);
        }
    }
}

const MAX_TRACKED_ACTIONS: usize = 16;

#[cfg(test)]
mod tests {
    use super::{ConversationId, ConversationState};
    use crate::flows::{WorkflowKind, WorkflowStep};

    #[test]
    fn switching_workflow_drops_scratch_of_previous_one() {
        let mut state = ConversationState::new(ConversationId("c-1".to_owned()));
        state.enter(WorkflowKind::Onboarding, WorkflowStep::Collecting);
        state.put_scratch("candidate", &"John");
        assert!(state.is_collecting());

        state.enter(WorkflowKind::Onboarding, WorkflowStep::Collecting);
        assert_eq!(state.scratch::<String>("candidate").as_deref(), Some("John"));

        state.enter(WorkflowKind::TimeOff, WorkflowStep::Collecting);
        assert!(state.scratch::<String>("candidate").is_none());
    }

    #[test]
    fn pending_action_history_is_bounded() {
        let mut state = ConversationState::new(ConversationId("c-2".to_owned()));
        state.record_pending_actions((0..40).map(|i| format!("token-{i}")));
        assert_eq!(state.pending_actions.len(), 16);
        assert_eq!(state.pending_actions.last().map(String::as_str), Some("token-39"));
    }
}
