//! Hosted model adapter for the agent crate's `LlmClient`.
//!
//! Speaks the OpenAI chat-completions shape or Ollama's `/api/chat`. The
//! request always asks for a deterministic answer; the classifier owns the
//! timeout and retry budget.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::debug;

use hrdesk_agent::LlmClient;
use hrdesk_core::config::{LlmConfig, LlmProvider};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

pub struct HttpLlmClient {
    client: reqwest::Client,
    provider: LlmProvider,
    endpoint: String,
    model: String,
    api_key: Option<SecretString>,
}

impl HttpLlmClient {
    /// `None` when the provider is disabled.
    pub fn from_config(config: &LlmConfig) -> Result<Option<Arc<dyn LlmClient>>> {
        let endpoint = match config.provider {
            LlmProvider::Disabled => return Ok(None),
            LlmProvider::OpenAi => {
                let base = config.base_url.as_deref().unwrap_or(OPENAI_BASE_URL);
                format!("{}/chat/completions", base.trim_end_matches('/'))
            }
            LlmProvider::Ollama => {
                let base = config
                    .base_url
                    .as_deref()
                    .ok_or_else(|| anyhow!("llm.base_url is required for ollama"))?;
                format!("{}/api/chat", base.trim_end_matches('/'))
            }
        };

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .context("could not build the model HTTP client")?;

        let llm: Arc<dyn LlmClient> = Arc::new(Self {
            client,
            provider: config.provider,
            endpoint,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        });
        Ok(Some(llm))
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = request_body(self.provider, &self.model, prompt);
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = self.api_key.as_ref() {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.context("model request failed")?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("model endpoint answered {status}"));
        }

        let body: Value = response.json().await.context("model response is not JSON")?;
        debug!(event_name = "llm.completion.received", model = %self.model, "model answered");
        answer_text(self.provider, &body)
    }
}

fn request_body(provider: LlmProvider, model: &str, prompt: &str) -> Value {
    let messages = json!([{ "role": "user", "content": prompt }]);
    match provider {
        LlmProvider::Ollama => json!({
            "model": model,
            "messages": messages,
            "stream": false,
            "options": { "temperature": 0 },
        }),
        _ => json!({
            "model": model,
            "messages": messages,
            "temperature": 0,
        }),
    }
}

fn answer_text(provider: LlmProvider, body: &Value) -> Result<String> {
    let content = match provider {
        LlmProvider::Ollama => body.pointer("/message/content"),
        _ => body.pointer("/choices/0/message/content"),
    };
    content
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| anyhow!("model response carries no message content"))
}

#[cfg(test)]
mod tests {
    use hrdesk_core::config::{AppConfig, LlmProvider};
    use serde_json::json;

    use super::{answer_text, request_body, HttpLlmClient};

    #[test]
    fn disabled_provider_yields_no_client() {
        let config = AppConfig::default();
        assert_eq!(config.llm.provider, LlmProvider::Disabled);
        assert!(HttpLlmClient::from_config(&config.llm).expect("config").is_none());
    }

    #[test]
    fn ollama_requests_disable_streaming() {
        let body = request_body(LlmProvider::Ollama, "llama3", "hello");
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["content"], "hello");
    }

    #[test]
    fn answers_are_read_from_the_provider_shape() {
        let openai = json!({"choices": [{"message": {"role": "assistant", "content": "{}"}}]});
        assert_eq!(answer_text(LlmProvider::OpenAi, &openai).expect("openai"), "{}");

        let ollama = json!({"message": {"role": "assistant", "content": "hi"}, "done": true});
        assert_eq!(answer_text(LlmProvider::Ollama, &ollama).expect("ollama"), "hi");

        assert!(answer_text(LlmProvider::OpenAi, &ollama).is_err());
    }
}
