use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use netops_core::config::{LlmConfig, LlmProvider};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::warn;

const RETRY_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

/// Text-completion collaborator. Replies are untrusted and parsed downstream.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Chat-completions client for OpenAI and OpenAI-compatible endpoints (Ollama's `/v1`).
pub struct OpenAiCompatibleClient {
    client: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    max_retries: u32,
}

#[derive(Serialize)]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ChatCompletionsResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompatibleClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let base_url = match (&config.base_url, config.provider) {
            (Some(base_url), _) => base_url.clone(),
            (None, LlmProvider::OpenAi) => "https://api.openai.com/v1".to_string(),
            (None, LlmProvider::Ollama) => return Err(anyhow!("llm.base_url is required for ollama")),
        };
        if config.provider == LlmProvider::OpenAi && config.api_key.is_none() {
            return Err(anyhow!("llm.api_key is required for the openai provider"));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to create HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, messages: &[ChatMessage]) -> Result<String> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&ChatCompletionsRequest { model: &self.model, messages });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await.context("request failed")?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_else(|_| "<unavailable>".to_string());
            return Err(anyhow!("http {status}: {body}"));
        }

        let payload = response
            .json::<ChatCompletionsResponse>()
            .await
            .context("invalid response payload")?;
        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("no choices returned"))
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let mut attempt = 0_u32;
        loop {
            match self.send(messages).await {
                Ok(text) => return Ok(text),
                Err(error) if is_retryable(&error) && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        event_name = "agent.llm.retrying",
                        model = %self.model,
                        attempt,
                        error = %error,
                        "collaborator request failed; retrying"
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(error) => {
                    return Err(error.context(format!("model={} attempts={}", self.model, attempt + 1)))
                }
            }
        }
    }
}

fn is_retryable(error: &anyhow::Error) -> bool {
    let text = format!("{error:#}");
    ["http 429", "http 500", "http 502", "http 503", "http 504", "request failed"]
        .iter()
        .any(|marker| text.contains(marker))
}
