//! Anthropic Messages API client

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{HistoryEntry, LanguageModel, LlmError, ModelId, Prompt};
use crate::config::LlmConfig;
use crate::error::PowderError;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    /// Extracts the text content from the first text block.
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

/// Wraps the Anthropic Messages API with retry logic and call recording.
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    endpoint: String,
    model: ModelId,
    name: String,
    max_tokens: u32,
    max_retries: u32,
    history: Mutex<Vec<HistoryEntry>>,
}

impl AnthropicClient {
    pub fn new(config: &LlmConfig, api_key: String, model: ModelId) -> Result<Self, PowderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.into()))
            .build()
            .map_err(|e| PowderError::llm(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            endpoint: format!("{}/messages", config.base_url.trim_end_matches('/')),
            name: model.to_string(),
            model,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            history: Mutex::new(Vec::new()),
        })
    }

    /// Makes a raw call to the API, returning the full response object.
    /// Retries on 429 (rate limit) and 5xx errors with exponential backoff.
    pub async fn call(&self, prompt: &Prompt) -> Result<LlmResponse, LlmError> {
        let request_body = AnthropicRequest {
            model: &self.model.model,
            max_tokens: self.max_tokens,
            system: &prompt.system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: &prompt.user,
            }],
        };

        let mut last_error: Option<LlmError> = None;

        for attempt in 0..self.attempts() {
            if attempt > 0 {
                // 1s, 2s, 4s, ...
                let delay = Duration::from_millis(1000 * (1 << (attempt - 1).min(6)));
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "LLM call failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(&self.endpoint)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&request_body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!(status = status.as_u16(), body = %body, "LLM API returned a retryable status");
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<AnthropicError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let llm_response: LlmResponse = response.json().await?;

            debug!(
                input_tokens = llm_response.usage.input_tokens,
                output_tokens = llm_response.usage.output_tokens,
                "LLM call succeeded"
            );

            return Ok(llm_response);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: self.max_retries,
        }))
    }

    /// The first try plus `max_retries` retries
    fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    fn record(&self, prompt: &Prompt, response: &LlmResponse, text: &str) {
        let entry = HistoryEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            model: self.name.clone(),
            system: prompt.system.clone(),
            user: prompt.user.clone(),
            response: text.to_string(),
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
        };
        if let Ok(mut history) = self.history.lock() {
            history.push(entry);
        }
    }
}

#[async_trait]
impl LanguageModel for AnthropicClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError> {
        let response = self.call(prompt).await?;
        let text = response.text().ok_or(LlmError::EmptyContent)?.to_string();
        self.record(prompt, &response, &text);
        Ok(text)
    }

    fn history(&self) -> Vec<HistoryEntry> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }
}
