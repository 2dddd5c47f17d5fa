//! Provider-neutral chat types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Default completion budget.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Wire name shared by every provider.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    /// Create a message.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Options and Results
// ─────────────────────────────────────────────────────────────────────────────

/// Per-call options.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Overrides the provider's configured model for this call.
    pub model: Option<String>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            model: None,
        }
    }
}

impl ChatOptions {
    /// Set the temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the completion budget.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Override the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// A completed chat reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    /// Extracted reply text.
    pub text: String,
    /// Provider usage block, `{}` if the provider sent none.
    pub usage: Value,
    /// The full response body.
    pub raw: Value,
}

impl ChatResponse {
    /// Build a response, defaulting a missing usage block to `{}`.
    pub fn new(text: impl Into<String>, usage: Option<Value>, raw: Value) -> Self {
        Self {
            text: text.into(),
            usage: usage.unwrap_or_else(|| Value::Object(Default::default())),
            raw,
        }
    }
}

/// Events emitted while streaming a reply.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A piece of reply text.
    Delta(String),
    /// Usage reported by the provider, usually once near the end.
    Usage(Value),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_serialization() {
        let msg = ChatMessage::user("hi");
        assert_eq!(serde_json::to_value(&msg).unwrap(), json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn test_message_deserialization() {
        let msgs: Vec<ChatMessage> = serde_json::from_value(json!([
            {"role": "system", "content": "be brief"},
            {"role": "assistant", "content": "ok"}
        ]))
        .unwrap();
        assert_eq!(msgs[0], ChatMessage::system("be brief"));
        assert_eq!(msgs[1].role, Role::Assistant);
    }

    #[test]
    fn test_options_defaults() {
        let opts = ChatOptions::default();
        assert_eq!(opts.temperature, 0.2);
        assert_eq!(opts.max_tokens, 1024);
        assert!(opts.model.is_none());

        let opts = opts.with_max_tokens(512).with_model("gpt-4o");
        assert_eq!(opts.max_tokens, 512);
        assert_eq!(opts.model.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn test_response_missing_usage() {
        let resp = ChatResponse::new("hello", None, json!({}));
        assert_eq!(resp.usage, json!({}));
    }
}
