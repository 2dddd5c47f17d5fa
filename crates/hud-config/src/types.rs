//! Configuration types.
//!
//! ```yaml
//! active_profile: work
//! profiles:
//!   default:
//!     provider: openai
//!     model: gpt-4o-mini
//!     roots: []
//!   work:
//!     provider: anthropic
//!     model: claude-3-5-sonnet-latest
//!     roots:
//!       - /home/me/src/project
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::paths::expand_tilde;

/// Name of the profile created when none exist.
pub const DEFAULT_PROFILE: &str = "default";

/// Provider used when neither the profile nor `HUD_PROVIDER` names one.
pub const DEFAULT_PROVIDER: &str = "openai";

/// Model used when neither the profile nor `HUD_MODEL` names one.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

// ─────────────────────────────────────────────────────────────────────────────
// Defaults
// ─────────────────────────────────────────────────────────────────────────────

/// Provider and model given to new profiles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defaults {
    pub provider: String,
    pub model: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

impl Defaults {
    /// Read `HUD_PROVIDER` and `HUD_MODEL` from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    /// Like [`Defaults::from_env`] with an explicit lookup.
    pub fn from_lookup(env: &dyn Fn(&str) -> Option<String>) -> Self {
        let pick = |key: &str, fallback: &str| {
            env(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| fallback.to_string())
        };
        Self {
            provider: pick("HUD_PROVIDER", DEFAULT_PROVIDER),
            model: pick("HUD_MODEL", DEFAULT_MODEL),
        }
    }

    /// A fresh profile with these defaults and no roots.
    pub fn profile(&self) -> Profile {
        Profile {
            provider: self.provider.clone(),
            model: self.model.clone(),
            roots: Vec::new(),
            extra: BTreeMap::new(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Profile
// ─────────────────────────────────────────────────────────────────────────────

/// A named provider/model pairing plus the directories hud may touch.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub provider: String,
    pub model: String,
    /// Directories file operations are confined to.
    pub roots: Vec<String>,
    /// Keys hud does not know about, kept as written.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Profile {
    /// Fill a blank provider or model from `defaults`.
    pub(crate) fn fill_blanks(&mut self, defaults: &Defaults) {
        if self.provider.trim().is_empty() {
            self.provider = defaults.provider.clone();
        }
        if self.model.trim().is_empty() {
            self.model = defaults.model.clone();
        }
    }

    /// Roots as paths.
    pub fn root_paths(&self) -> Vec<PathBuf> {
        self.roots.iter().map(PathBuf::from).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HudConfig
// ─────────────────────────────────────────────────────────────────────────────

/// The whole configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct HudConfig {
    pub profiles: BTreeMap<String, Profile>,
    pub active_profile: String,
    /// Unknown top-level keys, preserved on save.
    pub extra: BTreeMap<String, serde_yaml::Value>,
    defaults: Defaults,
}

impl HudConfig {
    /// A config with only the `default` profile.
    pub fn with_defaults(defaults: Defaults) -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert(DEFAULT_PROFILE.to_string(), defaults.profile());
        Self {
            profiles,
            active_profile: DEFAULT_PROFILE.to_string(),
            extra: BTreeMap::new(),
            defaults,
        }
    }

    /// Build a config from a parsed YAML document.
    ///
    /// Missing or malformed `profiles` fall back to the default profile;
    /// a missing `active_profile` selects `default`.
    pub fn from_yaml(document: serde_yaml::Value, defaults: Defaults) -> Self {
        let mut config = Self::with_defaults(defaults);

        let serde_yaml::Value::Mapping(mapping) = document else {
            if !document.is_null() {
                tracing::warn!("config file is not a mapping, using defaults");
            }
            return config;
        };

        for (key, value) in mapping {
            let Some(key) = key.as_str().map(String::from) else {
                continue;
            };
            match key.as_str() {
                "profiles" => {
                    match serde_yaml::from_value::<BTreeMap<String, Profile>>(value) {
                        Ok(profiles) if !profiles.is_empty() => config.profiles = profiles,
                        Ok(_) => {}
                        Err(e) => tracing::warn!(error = %e, "invalid profiles in config, using defaults"),
                    }
                }
                "active_profile" => {
                    if let Some(name) = value.as_str().filter(|n| !n.trim().is_empty()) {
                        config.active_profile = name.to_string();
                    }
                }
                _ => {
                    config.extra.insert(key, value);
                }
            }
        }

        let defaults = config.defaults.clone();
        for profile in config.profiles.values_mut() {
            profile.fill_blanks(&defaults);
        }
        config
    }

    /// Render the config as a YAML document with sorted top-level keys.
    pub fn to_yaml(&self) -> Result<String> {
        let mut document: BTreeMap<String, serde_yaml::Value> = self.extra.clone();
        document.insert(
            "profiles".to_string(),
            serde_yaml::to_value(&self.profiles).map_err(|e| ConfigError::Serialize(e.to_string()))?,
        );
        document.insert(
            "active_profile".to_string(),
            serde_yaml::Value::String(self.active_profile.clone()),
        );
        serde_yaml::to_string(&document).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// The defaults new profiles are created with.
    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    /// The active profile, created with default values if it does not exist.
    pub fn active_profile(&mut self) -> &mut Profile {
        let defaults = &self.defaults;
        self.profiles
            .entry(self.active_profile.clone())
            .or_insert_with(|| defaults.profile())
    }

    /// The active profile without creating it.
    pub fn active(&self) -> Option<&Profile> {
        self.profiles.get(&self.active_profile)
    }

    /// Switch profiles, creating the target with default values if needed.
    pub fn set_active_profile(&mut self, name: &str) -> &mut Profile {
        self.active_profile = name.to_string();
        self.active_profile()
    }

    /// Add a root to the active profile.
    ///
    /// The path is made absolute (and canonical when it exists). Adding a
    /// root that is already present changes nothing. Returns the stored path.
    pub fn ensure_root(&mut self, path: &str) -> Result<PathBuf> {
        let resolved = resolve_root(path)?;
        let as_string = resolved.display().to_string();

        let profile = self.active_profile();
        if !profile.roots.iter().any(|r| r == &as_string) {
            profile.roots.push(as_string);
        }
        Ok(resolved)
    }
}

fn resolve_root(path: &str) -> Result<PathBuf> {
    let expanded = expand_tilde(path.trim(), dirs::home_dir().as_deref());
    let invalid = |reason: String| ConfigError::InvalidRoot {
        path: path.to_string(),
        reason,
    };

    if expanded.as_os_str().is_empty() {
        return Err(invalid("empty path".to_string()));
    }
    match expanded.canonicalize() {
        Ok(canonical) => Ok(canonical),
        Err(_) => std::path::absolute(Path::new(&expanded)).map_err(|e| invalid(e.to_string())),
    }
}
