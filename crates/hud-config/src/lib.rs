//! Configuration for hud.
//!
//! Resolves the application home, migrates the legacy home, and loads and
//! saves the YAML config file holding profiles and roots.
//!
//! ```rust,ignore
//! use hud_config::{Defaults, HudPaths, load_config, save_config};
//!
//! let paths = HudPaths::discover()?;
//! let mut config = load_config(&paths.config_file(), Defaults::from_env())?;
//! config.ensure_root(".")?;
//! save_config(&config, &paths.config_file())?;
//! ```

pub mod error;
pub mod paths;
pub mod store;
pub mod types;

pub use error::{ConfigError, Result};
pub use paths::{HudPaths, expand_tilde};
pub use store::{load_config, save_config};
pub use types::{DEFAULT_MODEL, DEFAULT_PROFILE, DEFAULT_PROVIDER, Defaults, HudConfig, Profile};
