//! The provider trait and shared plumbing.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use parking_lot::Mutex;
use reqwest::{Client, Response, header};

use crate::error::{LlmError, Result};
use crate::types::{ChatMessage, ChatOptions, ChatResponse, StreamEvent};

/// Default timeout for provider requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Default retry budget for transient failures.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Initial backoff between retries; doubles each attempt.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// A streaming reply.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send + 'static>>;

/// A provider that can be shared across tasks.
pub type SharedProvider = Arc<dyn ChatProvider>;

// ─────────────────────────────────────────────────────────────────────────────
// Retry
// ─────────────────────────────────────────────────────────────────────────────

/// Execute an async operation with exponential backoff retry.
///
/// Retries only on transient errors (network failures and rate limits).
/// Non-retryable errors are returned immediately. A provider-supplied
/// `Retry-After` takes precedence over the computed backoff.
pub async fn with_retry<F, Fut, T>(
    max_retries: u32,
    initial_backoff: Duration,
    provider: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = initial_backoff;
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() || attempt >= max_retries => return Err(e),
            Err(e) => {
                let wait = e.retry_after().unwrap_or(backoff);
                attempt += 1;
                tracing::warn!(
                    provider,
                    attempt,
                    max_retries,
                    backoff_ms = wait.as_millis() as u64,
                    error = %e,
                    "Request failed, retrying"
                );
                tokio::time::sleep(wait).await;
                backoff *= 2;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Build the HTTP client every provider uses.
pub(crate) fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LlmError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Turn a non-success response into an error.
pub(crate) async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let body = response.text().await.unwrap_or_default();
    Err(LlmError::from_status(status, &body, retry_after.as_deref()))
}

/// Read a successful response body as JSON.
pub(crate) async fn json_body(response: Response) -> Result<serde_json::Value> {
    let body = check_status(response).await?.text().await?;
    Ok(serde_json::from_str(&body)?)
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat Provider Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A chat completion provider.
///
/// Implementations translate the uniform message list into one vendor's
/// wire format and extract the reply text.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider name, e.g. `openai`.
    fn name(&self) -> &str;

    /// Model used when the call does not override it.
    fn model(&self) -> &str;

    /// Send the conversation and wait for the whole reply.
    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<ChatResponse>;

    /// Send the conversation and stream the reply.
    ///
    /// The default implementation yields the whole reply as a single delta
    /// followed by its usage.
    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<TextStream> {
        let response = self.chat(messages, options).await?;
        let events = vec![
            Ok(StreamEvent::Delta(response.text)),
            Ok(StreamEvent::Usage(response.usage)),
        ];
        Ok(Box::pin(futures::stream::iter(events)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock Provider
// ─────────────────────────────────────────────────────────────────────────────

/// A provider that replays canned replies, for tests.
///
/// Replies are returned in order; an exhausted mock returns a backend error.
#[derive(Debug)]
pub struct MockProvider {
    replies: Mutex<Vec<String>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockProvider {
    /// Create a mock with the given replies.
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock with a single reply.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::new(vec![text.into()])
    }

    /// Every conversation sent so far.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().clone()
    }

    /// Number of calls made.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn chat(&self, messages: &[ChatMessage], _options: &ChatOptions) -> Result<ChatResponse> {
        self.requests.lock().push(messages.to_vec());

        let mut replies = self.replies.lock();
        if replies.is_empty() {
            return Err(LlmError::Backend(
                "MockProvider: no more replies available".to_string(),
            ));
        }
        let text = replies.remove(0);
        Ok(ChatResponse::new(
            text.clone(),
            Some(serde_json::json!({"prompt_tokens": 10, "completion_tokens": 20})),
            serde_json::json!({"text": text}),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_mock_provider_in_order() {
        let provider = MockProvider::new(vec!["First".into(), "Second".into()]);
        let opts = ChatOptions::default();

        let r1 = provider.chat(&[ChatMessage::user("1")], &opts).await.unwrap();
        let r2 = provider.chat(&[ChatMessage::user("2")], &opts).await.unwrap();

        assert_eq!(r1.text, "First");
        assert_eq!(r2.text, "Second");
        assert_eq!(provider.request_count(), 2);
        assert_eq!(provider.requests()[1], vec![ChatMessage::user("2")]);
    }

    #[tokio::test]
    async fn test_mock_provider_exhausted() {
        let provider = MockProvider::new(vec![]);
        let result = provider.chat(&[ChatMessage::user("hi")], &ChatOptions::default()).await;
        assert!(matches!(result, Err(LlmError::Backend(_))));
    }

    #[tokio::test]
    async fn test_default_stream_is_single_delta() {
        let provider = MockProvider::with_text("whole reply");
        let events: Vec<StreamEvent> = provider
            .chat_stream(&[ChatMessage::user("hi")], &ChatOptions::default())
            .await
            .unwrap()
            .map(|e| e.unwrap())
            .collect()
            .await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0], StreamEvent::Delta("whole reply".to_string()));
        assert!(matches!(events[1], StreamEvent::Usage(_)));
    }

    #[tokio::test]
    async fn test_with_retry_retries_network_errors() {
        let calls = AtomicU32::new(0);
        let result = with_retry(3, Duration::from_millis(1), "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(LlmError::Network("reset".to_string()))
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_gives_up() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(2, Duration::from_millis(1), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(LlmError::Network("down".to_string()))
        })
        .await;

        assert!(matches!(result, Err(LlmError::Network(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_does_not_retry_auth() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(3, Duration::from_millis(1), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(LlmError::Auth("bad key".to_string()))
        })
        .await;

        assert!(matches!(result, Err(LlmError::Auth(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
