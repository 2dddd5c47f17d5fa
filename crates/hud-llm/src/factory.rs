//! Provider selection by name.

use std::sync::Arc;

use crate::anthropic::{AnthropicConfig, AnthropicProvider};
use crate::azure::{AzureConfig, AzureProvider};
use crate::backend::SharedProvider;
use crate::error::Result;
use crate::gemini::{GeminiConfig, GeminiProvider};
use crate::openai::{OpenAiConfig, OpenAiProvider};

// ─────────────────────────────────────────────────────────────────────────────
// Provider Enum
// ─────────────────────────────────────────────────────────────────────────────

/// Supported chat providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// OpenAI or any OpenAI-compatible endpoint
    OpenAi,
    /// Azure OpenAI deployment
    Azure,
    /// Anthropic Messages API
    Anthropic,
    /// Google Gemini
    Gemini,
}

impl Provider {
    /// Get the string name for this provider.
    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Azure => "azure",
            Provider::Anthropic => "anthropic",
            Provider::Gemini => "gemini",
        }
    }

    /// Parse a provider name. Unrecognized names select OpenAI.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "azure" => Provider::Azure,
            "anthropic" | "claude" => Provider::Anthropic,
            "gemini" | "google" | "palm" => Provider::Gemini,
            _ => Provider::OpenAi,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Read a process environment variable, treating blank values as unset.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Build a provider from its name and model, reading credentials from the
/// process environment.
///
/// Missing credentials fail here rather than on the first request.
pub fn make_provider(name: &str, model: &str) -> Result<SharedProvider> {
    make_provider_with_env(name, model, &process_env)
}

/// Like [`make_provider`] with an explicit environment lookup.
pub fn make_provider_with_env(
    name: &str,
    model: &str,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<SharedProvider> {
    let provider = Provider::from_name(name);
    tracing::debug!(requested = %name, provider = %provider, model, "creating chat provider");

    Ok(match provider {
        Provider::OpenAi => Arc::new(OpenAiProvider::new(OpenAiConfig::from_env(model, env)?)?),
        Provider::Azure => Arc::new(AzureProvider::new(AzureConfig::from_env(env)?)?),
        Provider::Anthropic => Arc::new(AnthropicProvider::new(AnthropicConfig::from_env(
            model, env,
        )?)?),
        Provider::Gemini => Arc::new(GeminiProvider::new(GeminiConfig::from_env(model, env)?)?),
    })
}
