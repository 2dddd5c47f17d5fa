//! Application home resolution.
//!
//! # Environment Variables
//!
//! - `HUD_HOME` - Override the home directory
//! - `GPT_HUD_HOME` - Older name for the same override, used when `HUD_HOME` is unset
//!
//! Without either, the home is `~/.hud_cli`. If that does not exist yet but the
//! legacy `~/.gpt_hud` does, its config and audit log are copied across once.

use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

/// Environment variable that overrides the home directory.
pub const HOME_ENV: &str = "HUD_HOME";

/// Older override, consulted when [`HOME_ENV`] is unset.
pub const LEGACY_HOME_ENV: &str = "GPT_HUD_HOME";

/// Directory name under the user's home.
pub const DEFAULT_DIR_NAME: &str = ".hud_cli";

/// Directory name used by earlier releases.
pub const LEGACY_DIR_NAME: &str = ".gpt_hud";

pub const CONFIG_FILE: &str = "config.yaml";
pub const AUDIT_FILE: &str = "audit.log";
pub const LOG_DIR: &str = "logs";

/// Files carried over from the legacy home.
const MIGRATED_FILES: [&str; 2] = [CONFIG_FILE, AUDIT_FILE];

/// Locations of everything hud keeps on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HudPaths {
    home: PathBuf,
}

impl HudPaths {
    /// Use an explicit home directory.
    pub fn at(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Resolve the home from the process environment, migrating the legacy
    /// home when the default is used.
    pub fn discover() -> Result<Self> {
        let env = |key: &str| std::env::var(key).ok();
        let user_home = dirs::home_dir();
        Self::discover_with(&env, user_home.as_deref())
    }

    /// Like [`HudPaths::discover`] with an explicit environment and user home.
    pub fn discover_with(
        env: &dyn Fn(&str) -> Option<String>,
        user_home: Option<&Path>,
    ) -> Result<Self> {
        let override_home = [HOME_ENV, LEGACY_HOME_ENV]
            .into_iter()
            .filter_map(|key| env(key))
            .find(|value| !value.trim().is_empty());

        if let Some(home) = override_home {
            return Ok(Self::at(expand_tilde(&home, user_home)));
        }

        let user_home = user_home.ok_or(ConfigError::NoHomeDir)?;
        let home = user_home.join(DEFAULT_DIR_NAME);
        migrate_legacy_home(&user_home.join(LEGACY_DIR_NAME), &home);
        Ok(Self::at(home))
    }

    /// The home directory.
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// `<home>/config.yaml`
    pub fn config_file(&self) -> PathBuf {
        self.home.join(CONFIG_FILE)
    }

    /// `<home>/audit.log`
    pub fn audit_log(&self) -> PathBuf {
        self.home.join(AUDIT_FILE)
    }

    /// `<home>/logs`
    pub fn log_dir(&self) -> PathBuf {
        self.home.join(LOG_DIR)
    }

    /// Create the home directory if needed.
    pub fn ensure_home(&self) -> Result<()> {
        std::fs::create_dir_all(&self.home).map_err(|e| ConfigError::write(&self.home, e))
    }
}

/// Expand a leading `~` against the user's home.
pub fn expand_tilde(path: &str, user_home: Option<&Path>) -> PathBuf {
    match (path, user_home) {
        ("~", Some(home)) => home.to_path_buf(),
        (p, Some(home)) if p.starts_with("~/") => home.join(&p[2..]),
        (p, _) => PathBuf::from(p),
    }
}

/// Copy the legacy home's files into a new default home.
///
/// Runs only when `home` does not exist and `legacy` does. Failures are
/// logged and otherwise ignored. Returns whether anything was copied.
pub fn migrate_legacy_home(legacy: &Path, home: &Path) -> bool {
    if home.exists() || !legacy.is_dir() {
        return false;
    }

    if let Err(e) = std::fs::create_dir_all(home) {
        tracing::warn!(home = %home.display(), error = %e, "could not create home for migration");
        return false;
    }

    let mut copied = false;
    for file in MIGRATED_FILES {
        let from = legacy.join(file);
        if !from.is_file() {
            continue;
        }
        match std::fs::copy(&from, home.join(file)) {
            Ok(_) => copied = true,
            Err(e) => tracing::warn!(file, error = %e, "failed to migrate legacy file"),
        }
    }

    if copied {
        tracing::info!(
            from = %legacy.display(),
            to = %home.display(),
            "migrated legacy hud home"
        );
    }
    copied
}
