//! Error types for hud operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for operations.
pub type Result<T> = std::result::Result<T, OpsError>;

/// Errors from sandboxed file access and the audit log.
#[derive(Debug, Error)]
pub enum OpsError {
    /// Path is not within any configured root.
    #[error("Path {} is outside allowed roots", .path.display())]
    OutsideRoots { path: PathBuf },

    /// File does not exist.
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    /// File exceeds the read limit.
    #[error("File too large: {size} bytes > {limit}")]
    TooLarge { path: PathBuf, size: u64, limit: u64 },

    /// IO error on a specific path.
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl OpsError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
