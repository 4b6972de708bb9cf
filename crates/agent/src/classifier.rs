use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use serde_json::Value;
use tracing::{debug, warn};

use hrdesk_core::flows::WorkflowKind;

use crate::intents::{Classification, ClassificationSource, Intent};
use crate::llm::{extract_json, LlmClient};
use crate::shortcuts::match_shortcut;
use crate::slots::extract_for;

const SHORTCUT_CONFIDENCE: f32 = 0.9;
const CONTINUATION_CONFIDENCE: f32 = 1.0;

/// What the classifier knows about the conversation beyond the utterance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassifierContext {
    pub today: NaiveDate,
    /// Set when a workflow is still gathering slots for this conversation.
    pub collecting: Option<WorkflowKind>,
}

impl ClassifierContext {
    pub fn new(today: NaiveDate) -> Self {
        Self { today, collecting: None }
    }

    pub fn collecting(mut self, workflow: WorkflowKind) -> Self {
        self.collecting = Some(workflow);
        self
    }
}

/// Maps an utterance onto the closed intent set.
///
/// Resolution order: keyword shortcut, continuation of a collecting workflow,
/// then the model under a per-attempt timeout. Model failure never surfaces
/// as an error; the caller gets `Intent::Unknown` with zero confidence.
pub struct IntentClassifier {
    llm: Option<Arc<dyn LlmClient>>,
    timeout: Duration,
    max_retries: u32,
}

impl IntentClassifier {
    pub fn new(llm: Option<Arc<dyn LlmClient>>, timeout: Duration, max_retries: u32) -> Self {
        Self { llm, timeout, max_retries }
    }

    /// Keyword-only classifier, used when no model is configured.
    pub fn offline() -> Self {
        Self::new(None, Duration::from_secs(1), 0)
    }

    pub fn has_model(&self) -> bool {
        self.llm.is_some()
    }

    pub async fn classify(&self, utterance: &str, context: &ClassifierContext) -> Classification {
        if let Some(intent) = match_shortcut(utterance) {
            // A collecting workflow keeps its turn unless the user clearly
            // switched to something that is not itself a slot answer.
            if let Some(continuing) = context.collecting.and_then(Intent::collecting_intent) {
                if intent == continuing || !switches_away(intent) {
                    return self.continuation(continuing, utterance, context.today);
                }
            }
            debug!(intent = %intent, "intent resolved by shortcut");
            return Classification {
                intent,
                slots: extract_for(intent, utterance, context.today),
                confidence: SHORTCUT_CONFIDENCE,
                source: ClassificationSource::Shortcut,
            };
        }

        if let Some(continuing) = context.collecting.and_then(Intent::collecting_intent) {
            return self.continuation(continuing, utterance, context.today);
        }

        let Some(llm) = self.llm.as_deref() else {
            debug!("no model configured and no shortcut matched");
            return Classification::unknown();
        };

        let prompt = classification_prompt(utterance, context.today);
        let attempts = self.max_retries.saturating_add(1);
        for attempt in 1..=attempts {
            match self.ask(llm, &prompt).await {
                Ok(answer) => return interpret_answer(&answer, utterance, context.today),
                Err(error) => {
                    warn!(
                        attempt,
                        attempts,
                        error = %error,
                        "intent classification attempt failed"
                    );
                }
            }
        }

        Classification::unknown()
    }

    fn continuation(&self, intent: Intent, utterance: &str, today: NaiveDate) -> Classification {
        debug!(intent = %intent, "utterance continues collecting workflow");
        Classification {
            intent,
            slots: extract_for(intent, utterance, today),
            confidence: CONTINUATION_CONFIDENCE,
            source: ClassificationSource::Continuation,
        }
    }

    async fn ask(&self, llm: &dyn LlmClient, prompt: &str) -> Result<Value> {
        match tokio::time::timeout(self.timeout, extract_json(llm, prompt)).await {
            Ok(answer) => answer,
            Err(_) => Err(anyhow!("model did not answer within {:?}", self.timeout)),
        }
    }
}

/// Intents strong enough to abandon a half-filled form. Greetings and leave
/// words are treated as answers to the open question instead.
fn switches_away(intent: Intent) -> bool {
    matches!(
        intent,
        Intent::Onboarding
            | Intent::CheckBalance
            | Intent::ViewRequests
            | Intent::CancelRequest
            | Intent::ScheduleMeeting
            | Intent::ViewSchedule
            | Intent::CancelMeeting
    )
}

fn interpret_answer(answer: &Value, utterance: &str, today: NaiveDate) -> Classification {
    let intent = answer
        .get("intent")
        .and_then(Value::as_str)
        .and_then(Intent::parse)
        .unwrap_or(Intent::Unknown);
    let confidence = match intent {
        Intent::Unknown => 0.0,
        _ => answer
            .get("confidence")
            .and_then(Value::as_f64)
            .map(|value| value.clamp(0.0, 1.0) as f32)
            .unwrap_or(0.5),
    };

    let mut slots = extract_for(intent, utterance, today);
    if let Some(entities) = answer.get("entities") {
        slots.absorb_entities(entities, today);
    }

    Classification {
        intent,
        slots,
        confidence,
        source: ClassificationSource::Model,
    }
}

fn classification_prompt(utterance: &str, today: NaiveDate) -> String {
    let intents =
        Intent::ALL.iter().map(|intent| intent.as_str()).collect::<Vec<_>>().join(", ");
    format!(
        "You classify messages sent to an HR assistant. Today is {today}.\n\
         Allowed intents: {intents}.\n\
         Entities by intent:\n\
         - onboarding: firstName, lastName, email, personalEmail, jobTitle, department, phone\n\
         - request_leave, cancel_request: category (vacation|sick_leave|day_off|unpaid), \
           startDate, endDate (YYYY-MM-DD), reason\n\
         - schedule_meeting: participants (list of names or emails), \
           date (YYYY-MM-DD), time (HH:MM), durationMinutes, subject\n\
         - view_schedule, cancel_meeting: date (YYYY-MM-DD), person, subject\n\
         Answer with one JSON object and nothing else:\n\
         {{\"intent\": \"...\", \"confidence\": 0.0, \"entities\": {{}}}}\n\
         Message: {utterance}"
    )
}
