//! Chat provider abstraction for hud.
//!
//! One trait, [`ChatProvider`], with adapters for the vendors hud talks to.
//! Every adapter takes the same role/content message list and returns the
//! reply text together with the raw response.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  ChatProvider trait                          │
//! │  - chat() -> ChatResponse                    │
//! │  - chat_stream() -> Stream<StreamEvent>      │
//! └──────────────────────────────────────────────┘
//!                       │
//!     ┌─────────────┬───┴─────────┬─────────────┐
//!     ▼             ▼             ▼             ▼
//! ┌────────┐   ┌─────────┐   ┌───────────┐   ┌────────┐
//! │ OpenAI │   │  Azure  │   │ Anthropic │   │ Gemini │
//! └────────┘   └─────────┘   └───────────┘   └────────┘
//! ```

pub mod backend;
pub mod error;
pub mod factory;
pub mod sse;
pub mod types;

// Provider implementations
pub mod anthropic;
pub mod azure;
pub mod gemini;
pub mod openai;

pub use backend::{ChatProvider, MockProvider, SharedProvider, TextStream, with_retry};
pub use error::{LlmError, RateLimitInfo, Result};
pub use factory::{Provider, make_provider, make_provider_with_env, process_env};
pub use types::{
    ChatMessage, ChatOptions, ChatResponse, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, Role,
    StreamEvent,
};

pub use anthropic::{AnthropicConfig, AnthropicProvider};
pub use azure::{AzureConfig, AzureProvider};
pub use gemini::{GeminiConfig, GeminiProvider};
pub use openai::{OpenAiConfig, OpenAiProvider};
