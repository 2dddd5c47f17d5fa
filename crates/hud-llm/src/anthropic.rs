//! Anthropic Messages API provider.

use async_trait::async_trait;
use reqwest::{Client, header};
use serde_json::{Value, json};
use std::time::Duration;

use crate::backend::{
    ChatProvider, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BACKOFF, DEFAULT_TIMEOUT, http_client,
    json_body, with_retry,
};
use crate::error::{LlmError, Result};
use crate::types::{ChatMessage, ChatOptions, ChatResponse, Role};

/// Default Anthropic API base URL.
const DEFAULT_API_BASE: &str = "https://api.anthropic.com";

/// API version used when `ANTHROPIC_VERSION` is unset.
pub const DEFAULT_API_VERSION: &str = "2023-06-01";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the Anthropic provider.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// API key for authentication.
    pub api_key: String,

    /// Base URL for the API (without the `/v1/messages` suffix).
    pub base_url: String,

    /// Value of the `anthropic-version` header.
    pub api_version: String,

    /// Default model.
    pub model: String,

    /// Request timeout.
    pub timeout: Duration,

    /// Maximum retries for transient errors.
    pub max_retries: u32,

    /// Initial backoff duration for retries.
    pub retry_backoff: Duration,
}

impl AnthropicConfig {
    /// Create a new config with the given API key.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_API_BASE.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            model: model.into(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    /// Create config from `ANTHROPIC_API_KEY` and `ANTHROPIC_VERSION`.
    pub fn from_env(model: impl Into<String>, env: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key =
            env("ANTHROPIC_API_KEY").ok_or_else(|| LlmError::missing_env("ANTHROPIC_API_KEY"))?;
        let mut config = Self::new(api_key, model);
        if let Some(version) = env("ANTHROPIC_VERSION") {
            config.api_version = version;
        }
        Ok(config)
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set max retries.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire format
// ─────────────────────────────────────────────────────────────────────────────

/// Build a Messages API body. System messages are joined into the
/// top-level `system` field.
fn messages_body(messages: &[ChatMessage], options: &ChatOptions, model: &str) -> Value {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();

    let turns: Vec<Value> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
        .collect();

    let mut body = json!({
        "model": model,
        "max_tokens": options.max_tokens,
        "temperature": options.temperature,
        "messages": turns,
    });
    if !system.is_empty() {
        body["system"] = json!(system.join("\n\n"));
    }
    body
}

/// Concatenate the `text` parts of a Messages API response.
fn parse_response(raw: Value) -> Result<ChatResponse> {
    let content = raw
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| LlmError::Serialization("response has no content array".to_string()))?;

    let text: String = content
        .iter()
        .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();

    let usage = raw.get("usage").cloned();
    Ok(ChatResponse::new(text, usage, raw))
}

// ─────────────────────────────────────────────────────────────────────────────
// Anthropic Provider
// ─────────────────────────────────────────────────────────────────────────────

/// Anthropic chat provider.
///
/// Streaming uses the trait default: the complete reply as one delta.
pub struct AnthropicProvider {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider with the given configuration.
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout)?,
            config,
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.config.base_url)
    }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<ChatResponse> {
        let model = options.model.as_deref().unwrap_or(&self.config.model);
        let body = messages_body(messages, options, model);

        tracing::debug!(
            provider = "anthropic",
            model = %model,
            messages = messages.len(),
            "Sending chat request"
        );

        let raw = with_retry(
            self.config.max_retries,
            self.config.retry_backoff,
            "anthropic",
            || async {
                let response = self
                    .client
                    .post(self.messages_url())
                    .header(header::CONTENT_TYPE, "application/json")
                    .header("x-api-key", &self.config.api_key)
                    .header("anthropic-version", &self.config.api_version)
                    .json(&body)
                    .send()
                    .await?;
                json_body(response).await
            },
        )
        .await?;

        parse_response(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header as header_eq, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_system_messages_are_lifted() {
        let body = messages_body(
            &[
                ChatMessage::system("You are terse."),
                ChatMessage::user("hi"),
                ChatMessage::assistant("hello"),
                ChatMessage::system("No emoji."),
            ],
            &ChatOptions::default(),
            "claude-3-5-sonnet-latest",
        );

        assert_eq!(body["system"], "You are terse.\n\nNo emoji.");
        let turns = body["messages"].as_array().unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0]["role"], "user");
        assert_eq!(turns[1]["role"], "assistant");
    }

    #[test]
    fn test_no_system_field_without_system_messages() {
        let body = messages_body(&[ChatMessage::user("hi")], &ChatOptions::default(), "m");
        assert!(body.get("system").is_none());
    }

    #[test]
    fn test_parse_response_joins_text_parts() {
        let raw = json!({
            "content": [
                {"type": "text", "text": "Hello, "},
                {"type": "tool_use", "id": "t1", "name": "x", "input": {}},
                {"type": "text", "text": "world"}
            ],
            "usage": {"input_tokens": 4, "output_tokens": 2}
        });
        let resp = parse_response(raw).unwrap();
        assert_eq!(resp.text, "Hello, world");
        assert_eq!(resp.usage["output_tokens"], 2);
    }

    #[test]
    fn test_from_env_version_override() {
        let config = AnthropicConfig::from_env("m", &|key| match key {
            "ANTHROPIC_API_KEY" => Some("a".to_string()),
            "ANTHROPIC_VERSION" => Some("2024-01-01".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.api_version, "2024-01-01");

        assert!(AnthropicConfig::from_env("m", &|_| None).is_err());
    }

    #[tokio::test]
    async fn test_chat_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header_eq("x-api-key", "ant-key"))
            .and(header_eq("anthropic-version", DEFAULT_API_VERSION))
            .and(body_partial_json(json!({"system": "sys"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "hi there"}],
                "usage": {"input_tokens": 1, "output_tokens": 2}
            })))
            .mount(&server)
            .await;

        let provider = AnthropicProvider::new(
            AnthropicConfig::new("ant-key", "claude-3-5-haiku-latest")
                .with_base_url(server.uri())
                .with_max_retries(0),
        )
        .unwrap();

        let resp = provider
            .chat(
                &[ChatMessage::system("sys"), ChatMessage::user("hello")],
                &ChatOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(resp.text, "hi there");
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "3")
                    .set_body_json(json!({"error": {"type": "rate_limit_error", "message": "slow"}})),
            )
            .mount(&server)
            .await;

        let provider = AnthropicProvider::new(
            AnthropicConfig::new("k", "m")
                .with_base_url(server.uri())
                .with_max_retries(0),
        )
        .unwrap();
        let err = provider
            .chat(&[ChatMessage::user("x")], &ChatOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::RateLimit(_)));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
    }
}
