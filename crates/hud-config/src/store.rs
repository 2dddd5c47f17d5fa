//! Loading and saving the config file.

use std::path::Path;

use crate::error::{ConfigError, Result};
use crate::types::{Defaults, HudConfig};

/// Load the config at `path`.
///
/// A missing file yields the defaults. Any other read failure, or YAML
/// that does not parse, is an error.
pub fn load_config(path: &Path, defaults: Defaults) -> Result<HudConfig> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(HudConfig::with_defaults(defaults));
        }
        Err(e) => return Err(ConfigError::read(path, e)),
    };

    let document: serde_yaml::Value =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::ParseYaml(e.to_string()))?;

    let config = HudConfig::from_yaml(document, defaults);
    tracing::debug!(
        path = %path.display(),
        profiles = config.profiles.len(),
        active = %config.active_profile,
        "loaded config"
    );
    Ok(config)
}

/// Write `config` to `path`, creating parent directories.
pub fn save_config(config: &HudConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::write(parent, e))?;
    }

    let contents = config.to_yaml()?;
    std::fs::write(path, contents).map_err(|e| ConfigError::write(path, e))?;

    tracing::debug!(path = %path.display(), "saved config");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config(&dir.path().join("config.yaml"), Defaults::default()).unwrap();
        assert_eq!(config.active_profile, "default");
        assert_eq!(config.profiles.len(), 1);
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let mut config = HudConfig::with_defaults(Defaults::default());
        config.set_active_profile("work").provider = "anthropic".to_string();
        config.ensure_root(&dir.path().display().to_string()).unwrap();
        save_config(&config, &path).unwrap();

        let loaded = load_config(&path, Defaults::default()).unwrap();
        assert_eq!(loaded.active_profile, "work");
        assert_eq!(loaded.active().unwrap().provider, "anthropic");
        assert_eq!(loaded.active().unwrap().roots.len(), 1);
        assert!(loaded.profiles.contains_key("default"));
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "profiles: [unclosed\n").unwrap();

        let err = load_config(&path, Defaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseYaml(_)));
    }

    #[test]
    fn test_directory_instead_of_file_is_read_error() {
        let dir = TempDir::new().unwrap();
        let err = load_config(dir.path(), Defaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }
}
