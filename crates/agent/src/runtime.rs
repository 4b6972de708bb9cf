use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::llm::LlmClient;

pub const HELP_TEXT: &str = "I can help you with: onboarding a new employee (\"create account for \
Jane Doe, email: jane@example.com\"), requesting time off (\"vacation from next monday to \
friday\"), checking your leave balance, listing or cancelling your requests, and scheduling \
meetings (\"schedule a meeting with Anna tomorrow at 10:00\").";

/// Free-form answers for the chat workflow. Falls back to the static help
/// text when no model is configured or the model fails.
pub struct ChatResponder {
    llm: Option<Arc<dyn LlmClient>>,
    timeout: Duration,
}

impl ChatResponder {
    pub fn new(llm: Option<Arc<dyn LlmClient>>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    pub fn offline() -> Self {
        Self::new(None, Duration::from_secs(1))
    }

    pub async fn reply(&self, text: &str) -> String {
        let Some(llm) = self.llm.as_deref() else {
            return HELP_TEXT.to_string();
        };

        let prompt = format!(
            "You are a friendly HR assistant. Answer briefly in the language of the message. \
             If the message is unrelated to HR, say what you can help with.\n\nMessage: {text}"
        );
        match tokio::time::timeout(self.timeout, llm.complete(&prompt)).await {
            Ok(Ok(reply)) if !reply.trim().is_empty() => reply.trim().to_string(),
            Ok(Ok(_)) => HELP_TEXT.to_string(),
            Ok(Err(error)) => {
                warn!(error = %error, "chat reply failed, sending help text");
                HELP_TEXT.to_string()
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "chat reply timed out");
                HELP_TEXT.to_string()
            }
        }
    }
}
