//! Error types for the LLM crate.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Result type alias using the LLM error type.
pub type Result<T> = std::result::Result<T, LlmError>;

// ─────────────────────────────────────────────────────────────────────────────
// Rate Limit Info
// ─────────────────────────────────────────────────────────────────────────────

/// Information about a rate limit error.
#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    /// The error message from the provider.
    pub message: String,
    /// How long to wait before retrying (if the provider specified).
    pub retry_after: Option<Duration>,
}

impl RateLimitInfo {
    /// Parse rate limit info from a message and an optional `Retry-After` header.
    pub fn from_header(message: impl Into<String>, retry_after_header: Option<&str>) -> Self {
        Self {
            message: message.into(),
            retry_after: retry_after_header.and_then(parse_retry_after_header),
        }
    }
}

impl std::fmt::Display for RateLimitInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(retry_after) = self.retry_after {
            write!(f, " (retry after {:.2}s)", retry_after.as_secs_f64())?;
        }
        Ok(())
    }
}

/// Parse a Retry-After header value given in whole seconds.
fn parse_retry_after_header(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM Error
// ─────────────────────────────────────────────────────────────────────────────

/// Error type for LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Backend/API error from the provider.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Network/connectivity error (retryable).
    #[error("Network error: {0}")]
    Network(String),

    /// Configuration error (API key missing, etc.).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Rate limit exceeded (retryable with backoff).
    #[error("Rate limit exceeded: {0}")]
    RateLimit(RateLimitInfo),

    /// Authentication failed.
    #[error("Authentication error: {0}")]
    Auth(String),
}

impl LlmError {
    /// Create a missing-environment-variable configuration error.
    pub fn missing_env(var: &str) -> Self {
        Self::Config(format!("{var} environment variable not set"))
    }

    /// Get the retry-after duration if this is a rate limit error.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit(info) => info.retry_after,
            _ => None,
        }
    }

    /// Returns true if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimit(_))
    }

    /// Map a non-success HTTP status and body to an error.
    ///
    /// Every supported provider reports failures as `{"error": {"message": ...}}`;
    /// other bodies are quoted verbatim.
    pub fn from_status(status: StatusCode, body: &str, retry_after_header: Option<&str>) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| {
                v.get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(|m| m.as_str())
                    .map(String::from)
            })
            .unwrap_or_else(|| format!("HTTP {}: {}", status, body));

        match status.as_u16() {
            401 | 403 => LlmError::Auth(format!("Authentication failed: {}", message)),
            429 => LlmError::RateLimit(RateLimitInfo::from_header(message, retry_after_header)),
            500..=599 => LlmError::Backend(format!("Server error: {}", message)),
            _ => LlmError::Backend(message),
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Network(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            LlmError::Network(format!("Connection failed: {}", err))
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::Serialization(err.to_string())
    }
}
