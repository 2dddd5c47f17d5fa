//! Configuration error types.

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while locating, loading or saving configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to write a config file or create its directory.
    #[error("failed to write config file '{path}': {source}")]
    WriteFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse YAML.
    #[error("failed to parse YAML config: {0}")]
    ParseYaml(String),

    /// Failed to serialize config.
    #[error("failed to serialize config: {0}")]
    Serialize(String),

    /// No home directory could be determined.
    #[error("could not determine a home directory; set HUD_HOME")]
    NoHomeDir,

    /// A root path could not be resolved.
    #[error("invalid root '{path}': {reason}")]
    InvalidRoot { path: String, reason: String },
}

impl ConfigError {
    pub(crate) fn read(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::ReadFile {
            path: path.display().to_string(),
            source,
        }
    }

    pub(crate) fn write(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::WriteFile {
            path: path.display().to_string(),
            source,
        }
    }
}
