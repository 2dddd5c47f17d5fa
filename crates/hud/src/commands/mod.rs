//! CLI command handlers.

pub mod ask;
pub mod chat;
pub mod config;
pub mod mcp;
pub mod repl;

use anyhow::{Context as _, Result};
use hud_config::{ConfigError, Defaults, HudConfig, HudPaths};
use hud_llm::{LlmError, SharedProvider};
use hud_ops::AuditLog;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Where config, audit log and logs live.
    pub paths: HudPaths,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Provider name overriding the active profile.
    pub provider: Option<String>,
    /// Model overriding the active profile.
    pub model: Option<String>,
    /// Command line of an MCP tool server.
    pub mcp_cmd: Option<String>,
}

impl Context {
    pub fn load_config(&self) -> Result<HudConfig> {
        let path = self.paths.config_file();
        hud_config::load_config(&path, Defaults::from_env())
            .with_context(|| format!("loading {}", path.display()))
    }

    pub fn save_config(&self, config: &HudConfig) -> Result<()> {
        let path = self.paths.config_file();
        hud_config::save_config(config, &path).with_context(|| format!("saving {}", path.display()))
    }

    /// Provider and model for the active profile, after command-line overrides.
    pub fn provider_choice(&self, config: &mut HudConfig) -> (String, String) {
        let profile = config.active_profile();
        (
            self.provider.clone().unwrap_or_else(|| profile.provider.clone()),
            self.model.clone().unwrap_or_else(|| profile.model.clone()),
        )
    }

    pub fn make_provider(&self, config: &mut HudConfig) -> Result<SharedProvider> {
        let (provider, model) = self.provider_choice(config);
        hud_llm::make_provider(&provider, &model)
            .with_context(|| format!("creating {provider} provider"))
    }

    pub fn audit(&self) -> AuditLog {
        AuditLog::new(self.paths.audit_log())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Exit codes
// ─────────────────────────────────────────────────────────────────────────────

/// Bad arguments or missing setup, reported with exit code 2.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct UsageError(pub String);

impl UsageError {
    pub fn new(msg: impl Into<String>) -> anyhow::Error {
        anyhow::Error::new(Self(msg.into()))
    }
}

/// 2 for usage and configuration problems, 1 for everything else.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    let usage = err.chain().any(|cause| {
        cause.is::<UsageError>()
            || cause.is::<ConfigError>()
            || matches!(cause.downcast_ref::<LlmError>(), Some(LlmError::Config(_)))
    });
    if usage { 2 } else { 1 }
}
