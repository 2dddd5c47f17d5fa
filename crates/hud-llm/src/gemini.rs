//! Google Gemini `generateContent` provider.

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

/// Default Gemini API base URL.
pub const DEFAULT_GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_GEMINI_BASE.to_string(),
            model: model.into(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    /// Create config from `GEMINI_API_KEY` and `GEMINI_BASE_URL`.
    pub fn from_env(model: impl Into<String>, env: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = env("GEMINI_API_KEY").ok_or_else(|| LlmError::missing_env("GEMINI_API_KEY"))?;
        let config = Self::new(api_key, model);
        Ok(match env("GEMINI_BASE_URL") {
            Some(url) => config.with_base_url(url),
            None => config,
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

/// Strip a leading `models/` so both `gemini-1.5-flash` and
/// `models/gemini-1.5-flash` address the same endpoint.
fn bare_model(model: &str) -> &str {
    model.strip_prefix("models/").unwrap_or(model)
}

fn generate_body(messages: &[ChatMessage], options: &ChatOptions) -> Value {
    let contents: Vec<Value> = messages
        .iter()
        .map(|m| {
            let role = if m.role == Role::User { "user" } else { "model" };
            json!({"role": role, "parts": [{"text": m.content}]})
        })
        .collect();

    json!({
        "contents": contents,
        "generationConfig": {
            "temperature": options.temperature,
            "maxOutputTokens": options.max_tokens,
        }
    })
}

fn parse_response(raw: Value) -> Result<ChatResponse> {
    let text = raw
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            LlmError::Serialization("response has no candidates[0].content.parts[0].text".to_string())
        })?
        .to_string();

    let usage = raw.get("usageMetadata").cloned();
    Ok(ChatResponse::new(text, usage, raw))
}

/// Gemini chat provider.
pub struct GeminiProvider {
    client: Client,
    config: GeminiConfig,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout)?,
            config,
        })
    }

    fn generate_url(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url,
            bare_model(model)
        )
    }
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<ChatResponse> {
        let model = options.model.as_deref().unwrap_or(&self.config.model);
        let url = self.generate_url(model);
        let body = generate_body(messages, options);

        tracing::debug!(
            provider = "gemini",
            model = %bare_model(model),
            messages = messages.len(),
            "Sending chat request"
        );

        let raw = with_retry(
            self.config.max_retries,
            self.config.retry_backoff,
            "gemini",
            || async {
                let response = self
                    .client
                    .post(&url)
                    .query(&[("key", self.config.api_key.as_str())])
                    .header(header::CONTENT_TYPE, "application/json")
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
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_bare_model() {
        assert_eq!(bare_model("models/gemini-1.5-flash"), "gemini-1.5-flash");
        assert_eq!(bare_model("gemini-1.5-pro"), "gemini-1.5-pro");
    }

    #[test]
    fn test_roles_map_to_user_and_model() {
        let body = generate_body(
            &[
                ChatMessage::system("rules"),
                ChatMessage::user("q"),
                ChatMessage::assistant("a"),
            ],
            &ChatOptions::default().with_max_tokens(99),
        );
        let roles: Vec<&str> = body["contents"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["model", "user", "model"]);
        assert_eq!(body["contents"][1]["parts"][0]["text"], "q");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 99);
    }

    #[test]
    fn test_parse_response_missing_text() {
        assert!(parse_response(json!({"candidates": []})).is_err());
    }

    #[tokio::test]
    async fn test_chat_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-1.5-flash:generateContent"))
            .and(query_param("key", "g-key"))
            .and(body_partial_json(json!({"generationConfig": {"maxOutputTokens": 1024}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "bonjour"}], "role": "model"}}],
                "usageMetadata": {"totalTokenCount": 12}
            })))
            .mount(&server)
            .await;

        let provider = GeminiProvider::new(
            GeminiConfig::new("g-key", "models/gemini-1.5-flash")
                .with_base_url(server.uri())
                .with_max_retries(0),
        )
        .unwrap();
        let resp = provider
            .chat(&[ChatMessage::user("hello")], &ChatOptions::default())
            .await
            .unwrap();

        assert_eq!(resp.text, "bonjour");
        assert_eq!(resp.usage["totalTokenCount"], 12);
    }
}
