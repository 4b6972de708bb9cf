use crate::intents::{Classification, ClassificationSource, Intent};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.55;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, user_message: String, fallback_path: &'static str },
    Degrade { reason_code: &'static str, user_message: String, fallback_path: &'static str },
}

impl GuardrailDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Decides whether a classification is trustworthy enough to start a
/// workflow. Shortcuts and continuations are deterministic and always pass
/// the confidence gate; model answers must clear the threshold.
#[derive(Clone, Debug, PartialEq)]
pub struct GuardrailPolicy {
    pub confidence_threshold: f32,
    /// Intents whose backing capability is not wired in this deployment.
    pub disabled_intents: Vec<Intent>,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD, disabled_intents: Vec::new() }
    }
}

impl GuardrailPolicy {
    pub fn with_threshold(confidence_threshold: f32) -> Self {
        Self { confidence_threshold, ..Self::default() }
    }

    pub fn disable(mut self, intent: Intent) -> Self {
        if !self.disabled_intents.contains(&intent) {
            self.disabled_intents.push(intent);
        }
        self
    }

    pub fn evaluate(&self, classification: &Classification) -> GuardrailDecision {
        if self.disabled_intents.contains(&classification.intent) {
            return GuardrailDecision::Deny {
                reason_code: "intent_disabled",
                user_message: format!(
                    "I can't help with {} here yet. Please contact HR directly.",
                    describe(classification.intent)
                ),
                fallback_path: "contact_hr",
            };
        }

        match (classification.intent, classification.source) {
            (Intent::Unknown, _) => GuardrailDecision::Degrade {
                reason_code: "unknown_intent",
                user_message: "I'm not sure what you need. I can onboard a new employee, \
                               request time off, check your balance or schedule a meeting."
                    .to_string(),
                fallback_path: "clarify_intent",
            },
            (_, ClassificationSource::Shortcut | ClassificationSource::Continuation) => {
                GuardrailDecision::Allow
            }
            (intent, _) if classification.confidence < self.confidence_threshold => {
                GuardrailDecision::Degrade {
                    reason_code: "low_confidence",
                    user_message: format!(
                        "Did you want to {}? Please rephrase so I can be sure.",
                        describe(intent)
                    ),
                    fallback_path: "clarify_intent",
                }
            }
            _ => GuardrailDecision::Allow,
        }
    }
}

fn describe(intent: Intent) -> &'static str {
    match intent {
        Intent::Onboarding => "onboard a new employee",
        Intent::RequestLeave => "request time off",
        Intent::CheckBalance => "check your leave balance",
        Intent::ViewRequests => "see your leave requests",
        Intent::CancelRequest => "cancel a leave request",
        Intent::ScheduleMeeting => "schedule a meeting",
        Intent::ViewSchedule => "look at a calendar",
        Intent::CancelMeeting => "cancel a meeting",
        Intent::Chat => "chat",
        Intent::Unknown => "do something else",
    }
}

#[cfg(test)]
mod tests {
    use super::{GuardrailDecision, GuardrailPolicy};
    use crate::intents::{Classification, ClassificationSource, Intent};
    use crate::slots::Slots;

    fn classified(intent: Intent, confidence: f32, source: ClassificationSource) -> Classification {
        Classification { intent, slots: Slots::None, confidence, source }
    }

    #[test]
    fn confident_model_answer_is_allowed() {
        let policy = GuardrailPolicy::default();
        let decision =
            policy.evaluate(&classified(Intent::RequestLeave, 0.8, ClassificationSource::Model));
        assert_eq!(decision, GuardrailDecision::Allow);
    }

    #[test]
    fn low_confidence_degrades_to_clarification() {
        let policy = GuardrailPolicy::default();
        let decision =
            policy.evaluate(&classified(Intent::ScheduleMeeting, 0.3, ClassificationSource::Model));

        let (reason_code, user_message, fallback_path) = match decision {
            GuardrailDecision::Degrade { reason_code, user_message, fallback_path } => {
                (reason_code, user_message, fallback_path)
            }
            _ => ("", String::new(), ""),
        };

        assert_eq!(reason_code, "low_confidence");
        assert!(user_message.contains("schedule a meeting"));
        assert_eq!(fallback_path, "clarify_intent");
    }

    #[test]
    fn shortcuts_bypass_the_threshold() {
        let policy = GuardrailPolicy::with_threshold(0.95);
        let decision =
            policy.evaluate(&classified(Intent::Onboarding, 0.9, ClassificationSource::Shortcut));
        assert!(decision.is_allowed());
    }

    #[test]
    fn unknown_intent_always_degrades() {
        let policy = GuardrailPolicy::default();
        let decision = policy.evaluate(&Classification::unknown());
        assert!(matches!(
            decision,
            GuardrailDecision::Degrade { reason_code: "unknown_intent", .. }
        ));
    }

    #[test]
    fn disabled_intent_is_denied() {
        let policy = GuardrailPolicy::default().disable(Intent::Onboarding);
        let decision =
            policy.evaluate(&classified(Intent::Onboarding, 0.9, ClassificationSource::Shortcut));
        assert!(matches!(
            decision,
            GuardrailDecision::Deny {
                reason_code: "intent_disabled",
                fallback_path: "contact_hr",
                ..
            }
        ));
    }
}
