//! Azure OpenAI provider.
//!
//! Same body and stream format as OpenAI, but the model is chosen by the
//! deployment in the URL and authentication uses the `api-key` header.

use async_trait::async_trait;
use reqwest::{Client, header};
use std::time::Duration;

use crate::backend::{
    ChatProvider, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BACKOFF, DEFAULT_TIMEOUT, TextStream,
    check_status, http_client, json_body, with_retry,
};
use crate::error::{LlmError, Result};
use crate::openai::{chat_body, event_stream, parse_chat_response};
use crate::types::{ChatMessage, ChatOptions, ChatResponse};

/// API version used when `AZURE_OPENAI_API_VERSION` is unset.
pub const DEFAULT_API_VERSION: &str = "2025-01-01-preview";

/// Configuration for an Azure OpenAI deployment.
#[derive(Debug, Clone)]
pub struct AzureConfig {
    /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`.
    pub endpoint: String,
    /// Deployment name.
    pub deployment: String,
    pub api_key: String,
    pub api_version: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl AzureConfig {
    /// Create a config for a deployment.
    pub fn new(
        endpoint: impl Into<String>,
        deployment: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            deployment: deployment.into(),
            api_key: api_key.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    /// Create a config from the `AZURE_OPENAI_*` variables.
    pub fn from_env(env: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let require = |key: &str| env(key).ok_or_else(|| LlmError::missing_env(key));

        let mut config = Self::new(
            require("AZURE_OPENAI_ENDPOINT")?,
            require("AZURE_OPENAI_DEPLOYMENT")?,
            require("AZURE_OPENAI_API_KEY")?,
        );
        if let Some(version) = env("AZURE_OPENAI_API_VERSION") {
            config.api_version = version;
        }
        Ok(config)
    }

    /// Set max retries.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

/// Azure OpenAI chat provider.
pub struct AzureProvider {
    client: Client,
    config: AzureConfig,
}

impl AzureProvider {
    pub fn new(config: AzureConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout)?,
            config,
        })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.config.endpoint, self.config.deployment, self.config.api_version
        )
    }

    fn post(&self) -> reqwest::RequestBuilder {
        self.client
            .post(self.completions_url())
            .header(header::CONTENT_TYPE, "application/json")
            .header("api-key", &self.config.api_key)
    }
}

#[async_trait]
impl ChatProvider for AzureProvider {
    fn name(&self) -> &str {
        "azure"
    }

    fn model(&self) -> &str {
        &self.config.deployment
    }

    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<ChatResponse> {
        let body = chat_body(messages, options, None, false);

        tracing::debug!(
            provider = "azure",
            deployment = %self.config.deployment,
            messages = messages.len(),
            "Sending chat request"
        );

        let raw = with_retry(
            self.config.max_retries,
            self.config.retry_backoff,
            "azure",
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
        let body = chat_body(messages, options, None, true);
        let response = check_status(self.post().json(&body).send().await?).await?;
        Ok(event_stream(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header as header_eq, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_from_env_requires_all_three() {
        let err = AzureConfig::from_env(&|key| {
            (key == "AZURE_OPENAI_ENDPOINT").then(|| "https://x.openai.azure.com".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("AZURE_OPENAI_DEPLOYMENT"));
    }

    #[test]
    fn test_from_env_default_version() {
        let config = AzureConfig::from_env(&|key| match key {
            "AZURE_OPENAI_ENDPOINT" => Some("https://x.openai.azure.com/".to_string()),
            "AZURE_OPENAI_DEPLOYMENT" => Some("gpt4o".to_string()),
            "AZURE_OPENAI_API_KEY" => Some("k".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.api_version, DEFAULT_API_VERSION);
        assert_eq!(config.endpoint, "https://x.openai.azure.com");
    }

    #[tokio::test]
    async fn test_chat_uses_deployment_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/gpt4o/chat/completions"))
            .and(query_param("api-version", DEFAULT_API_VERSION))
            .and(header_eq("api-key", "azure-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "from azure"}}]
            })))
            .mount(&server)
            .await;

        let provider = AzureProvider::new(
            AzureConfig::new(server.uri(), "gpt4o", "azure-key").with_max_retries(0),
        )
        .unwrap();
        let resp = provider
            .chat(&[ChatMessage::user("hi")], &ChatOptions::default())
            .await
            .unwrap();

        assert_eq!(resp.text, "from azure");
        assert_eq!(provider.model(), "gpt4o");
    }
}
