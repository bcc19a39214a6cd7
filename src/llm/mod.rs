//! Language model access.
//!
//! Every structured stage and the agent talk to a [`LanguageModel`]. The
//! production implementation is [`AnthropicClient`]; tests and evals can
//! substitute scripted models.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::config::LlmConfig;
use crate::error::PowderError;

mod anthropic;

pub use anthropic::AnthropicClient;

pub const DEFAULT_MODEL: &str = "anthropic/claude-haiku-4-5-20251001";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("No JSON object in LLM output: {0}")]
    NoJson(String),
}

/// A single-turn prompt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// One recorded model call, written into trace files
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub timestamp: String,
    pub model: String,
    pub system: String,
    pub user: String,
    pub response: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier used in traces
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError>;

    /// Calls made so far, oldest first
    fn history(&self) -> Vec<HistoryEntry> {
        Vec::new()
    }

    /// Calls made after the first `start`, so a shared client can trace one
    /// query at a time
    fn history_since(&self, start: usize) -> Vec<HistoryEntry> {
        self.history().into_iter().skip(start).collect()
    }
}

/// `provider/model` identifier as accepted by `--model`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelId {
    pub provider: String,
    pub model: String,
}

impl ModelId {
    pub fn parse(id: &str) -> Result<Self, PowderError> {
        let (provider, model) = match id.trim().split_once('/') {
            Some((provider, model)) => (provider.trim().to_lowercase(), model.trim()),
            None => ("anthropic".to_string(), id.trim()),
        };
        if model.is_empty() {
            return Err(PowderError::config(format!("Model id '{id}' has no model name")));
        }
        if provider != "anthropic" {
            return Err(PowderError::config(format!(
                "Unsupported model provider '{provider}', only anthropic is available"
            )));
        }
        Ok(Self {
            provider,
            model: model.to_string(),
        })
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// Build the configured model, with an optional `--model` override
pub fn build_model(
    config: &LlmConfig,
    api_key: String,
    model_override: Option<&str>,
) -> Result<AnthropicClient, PowderError> {
    let id = ModelId::parse(model_override.unwrap_or(&config.model))?;
    AnthropicClient::new(config, api_key, id)
}

/// Locate the JSON object in a model response.
///
/// Accepts ```json fences, bare ``` fences, or the first balanced `{...}`
/// in free text.
#[must_use]
pub fn extract_json(text: &str) -> Option<&str> {
    let text = text.trim();
    for fence in ["```json", "```"] {
        if let Some(start) = text.find(fence) {
            let body = &text[start + fence.len()..];
            let body = body.find("```").map_or(body, |end| &body[..end]);
            let body = body.trim();
            if body.starts_with('{') {
                return Some(body);
            }
        }
    }
    first_object(text)
}

fn first_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("```json\n{\"key\": \"value\"}\n```", "{\"key\": \"value\"}")]
    #[case("```\n{\"key\": \"value\"}\n```", "{\"key\": \"value\"}")]
    #[case("{\"key\": \"value\"}", "{\"key\": \"value\"}")]
    #[case("Here you go:\n{\"a\": {\"b\": 1}} hope it helps", "{\"a\": {\"b\": 1}}")]
    #[case("{\"note\": \"use } carefully \\\" {\"}", "{\"note\": \"use } carefully \\\" {\"}")]
    fn test_extract_json(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(extract_json(input), Some(expected));
    }

    #[test]
    fn test_extract_json_without_object() {
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("{\"unterminated\": 1"), None);
    }

    #[test]
    fn test_model_id_parse() {
        let id = ModelId::parse(DEFAULT_MODEL).unwrap();
        assert_eq!(id.provider, "anthropic");
        assert_eq!(id.model, "claude-haiku-4-5-20251001");
        assert_eq!(id.to_string(), DEFAULT_MODEL);

        let bare = ModelId::parse("claude-sonnet-4-5").unwrap();
        assert_eq!(bare.provider, "anthropic");
    }

    #[test]
    fn test_unsupported_provider_is_config_error() {
        let err = ModelId::parse("openai/gpt-4o").unwrap_err();
        assert!(matches!(err, PowderError::Config { .. }));
        assert!(ModelId::parse("anthropic/").is_err());
    }
}
