//! OpenAI-compatible API provider.
//!
//! Works against OpenAI itself or anything that serves the same
//! `/chat/completions` endpoint (set `OPENAI_BASE_URL`). The request and
//! response helpers here are shared with the Azure provider, which speaks
//! the same body format.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, header};
use serde_json::{Value, json};
use std::time::Duration;

use crate::backend::{
    ChatProvider, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BACKOFF, DEFAULT_TIMEOUT, TextStream,
    check_status, http_client, json_body, with_retry,
};
use crate::error::{LlmError, Result};
use crate::sse;
use crate::types::{ChatMessage, ChatOptions, ChatResponse, StreamEvent};

/// Default OpenAI API base URL.
pub const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the OpenAI-compatible provider.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key for the `Authorization: Bearer` header.
    pub api_key: String,

    /// Base URL for the API.
    pub base_url: String,

    /// Default model.
    pub model: String,

    /// Request timeout.
    pub timeout: Duration,

    /// Maximum retries for transient errors.
    pub max_retries: u32,

    /// Initial backoff duration for retries.
    pub retry_backoff: Duration,
}

impl OpenAiConfig {
    /// Create a config for OpenAI.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_OPENAI_BASE.to_string(),
            model: model.into(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    /// Create a config from `OPENAI_API_KEY` and `OPENAI_BASE_URL`.
    pub fn from_env(model: impl Into<String>, env: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = env("OPENAI_API_KEY").ok_or_else(|| LlmError::missing_env("OPENAI_API_KEY"))?;
        let config = Self::new(api_key, model);
        Ok(match env("OPENAI_BASE_URL") {
            Some(url) => config.with_base_url(url),
            None => config,
        })
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set max retries.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared wire helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Build a chat completions body. `model` is omitted for Azure, which
/// selects the model by deployment.
pub(crate) fn chat_body(
    messages: &[ChatMessage],
    options: &ChatOptions,
    model: Option<&str>,
    stream: bool,
) -> Value {
    let messages: Vec<Value> = messages
        .iter()
        .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
        .collect();

    let mut body = json!({
        "messages": messages,
        "temperature": options.temperature,
        "max_tokens": options.max_tokens,
        "stream": stream,
    });
    if let Some(model) = model {
        body["model"] = json!(model);
    }
    body
}

/// Extract the reply from a chat completions response.
pub(crate) fn parse_chat_response(raw: Value) -> Result<ChatResponse> {
    let message = raw
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| {
            LlmError::Serialization("response has no choices[0].message".to_string())
        })?;

    let text = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let usage = raw.get("usage").cloned();
    Ok(ChatResponse::new(text, usage, raw))
}

/// Map one streamed chunk to events. Chunks that carry neither text nor
/// usage produce nothing.
pub(crate) fn chunk_events(chunk: &Value) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    if let Some(text) = chunk
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(Value::as_str)
    {
        if !text.is_empty() {
            events.push(StreamEvent::Delta(text.to_string()));
        }
    }

    if let Some(usage) = chunk.get("usage").filter(|u| u.is_object()) {
        events.push(StreamEvent::Usage(usage.clone()));
    }

    events
}

/// Turn an SSE response into a stream of events, skipping unparseable chunks.
pub(crate) fn event_stream(response: reqwest::Response) -> TextStream {
    let events = sse::data_stream(response.bytes_stream()).flat_map(|item| {
        let events: Vec<Result<StreamEvent>> = match item {
            Ok(data) => match serde_json::from_str::<Value>(&data) {
                Ok(chunk) => chunk_events(&chunk).into_iter().map(Ok).collect(),
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unparseable stream chunk");
                    Vec::new()
                }
            },
            Err(e) => vec![Err(e)],
        };
        futures::stream::iter(events)
    });
    Box::pin(events)
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI Provider
// ─────────────────────────────────────────────────────────────────────────────

/// OpenAI-compatible chat provider.
pub struct OpenAiProvider {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    /// Create a provider with the given configuration.
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout)?,
            config,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    fn post(&self) -> reqwest::RequestBuilder {
        self.client
            .post(self.completions_url())
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {}", self.config.api_key))
    }

    fn model_for<'a>(&'a self, options: &'a ChatOptions) -> &'a str {
        options.model.as_deref().unwrap_or(&self.config.model)
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<ChatResponse> {
        let model = self.model_for(options);
        let body = chat_body(messages, options, Some(model), false);

        tracing::debug!(
            provider = "openai",
            model = %model,
            messages = messages.len(),
            "Sending chat request"
        );

        let raw = with_retry(
            self.config.max_retries,
            self.config.retry_backoff,
            "openai",
            || async { json_body(self.post().json(&body).send().await?).await },
        )
        .await?;

        parse_chat_response(raw)
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<TextStream> {
        let body = chat_body(messages, options, Some(self.model_for(options)), true);
        let response = check_status(self.post().json(&body).send().await?).await?;
        Ok(event_stream(response))
    }
}
