use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;

/// Text-completion capability. Implementations talk to a hosted model; the
/// agent only ever asks for JSON it can validate.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Sends `prompt` and parses the answer as a JSON object.
pub async fn extract_json(client: &dyn LlmClient, prompt: &str) -> Result<Value> {
    let raw = client.complete(prompt).await?;
    parse_json_answer(&raw)
}

/// Models like to wrap JSON in markdown fences; strip them before parsing.
pub fn parse_json_answer(raw: &str) -> Result<Value> {
    let cleaned = raw.trim().trim_start_matches("```json").trim_start_matches("```");
    let cleaned = cleaned.trim_end_matches("```").trim();
    let value: Value = serde_json::from_str(cleaned).context("model answer is not valid JSON")?;
    if !value.is_object() {
        return Err(anyhow!("model answer is not a JSON object"));
    }
    Ok(value)
}

/// Deterministic client for tests and offline runs: replays queued answers in
/// order, optionally after a delay, and fails once the queue is empty.
#[derive(Default)]
pub struct ScriptedLlmClient {
    answers: Mutex<VecDeque<Result<String, String>>>,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlmClient {
    pub fn new(answers: impl IntoIterator<Item = Result<String, String>>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn answering(answer: impl Into<String>) -> Self {
        Self::new([Ok(answer.into())])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        match self.prompts.lock() {
            Ok(prompts) => prompts.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts().len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        match self.prompts.lock() {
            Ok(mut prompts) => prompts.push(prompt.to_owned()),
            Err(poisoned) => poisoned.into_inner().push(prompt.to_owned()),
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = match self.answers.lock() {
            Ok(mut answers) => answers.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        match next {
            Some(Ok(answer)) => Ok(answer),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted answer left")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{extract_json, parse_json_answer, ScriptedLlmClient};

    #[test]
    fn fenced_answers_are_unwrapped() {
        let value = parse_json_answer("```json\n{\"intent\": \"chat\"}\n```").expect("parse");
        assert_eq!(value["intent"], "chat");
    }

    #[test]
    fn non_object_answers_are_rejected() {
        assert!(parse_json_answer("[1, 2]").is_err());
        assert!(parse_json_answer("sure, here you go").is_err());
    }

    #[tokio::test]
    async fn scripted_client_replays_in_order_then_fails() {
        let client = ScriptedLlmClient::new([
            Err("connection reset".to_string()),
            Ok("{\"intent\": \"onboarding\"}".to_string()),
        ]);

        assert!(extract_json(&client, "first").await.is_err());
        let value = extract_json(&client, "second").await.expect("second answer");
        assert_eq!(value["intent"], "onboarding");
        assert!(extract_json(&client, "third").await.is_err());
        assert_eq!(client.calls(), 3);
    }
}
