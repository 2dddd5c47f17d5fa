//! Error types for MCP operations.

use std::time::Duration;

use thiserror::Error;

/// Result type for MCP operations.
pub type Result<T> = std::result::Result<T, McpError>;

/// Error type for MCP operations.
///
/// Malformed frames never show up here: the stdout reader drops them and
/// keeps going.
#[derive(Debug, Error)]
pub enum McpError {
    /// The server process could not be spawned.
    #[error("failed to spawn MCP server: {0}")]
    SpawnFailed(String),

    /// The server process exited (or its pipes closed) while a request was
    /// pending or about to be sent.
    #[error("MCP process not running (stderr: {stderr})")]
    TransportDied {
        /// Most recent stderr lines, joined with `" | "`.
        stderr: String,
    },

    /// The server answered with a JSON-RPC error object.
    #[error("server error {code}: {message}")]
    ServerError {
        /// Error code from the server.
        code: i64,
        /// Error message from the server.
        message: String,
        /// Optional additional data.
        data: Option<serde_json::Value>,
    },

    /// No matching response arrived in time while the process stayed alive.
    #[error("MCP request timeout: {method} (after {elapsed:?})")]
    Timeout {
        /// Method that timed out.
        method: String,
        /// How long the caller waited.
        elapsed: Duration,
    },

    /// `start()` has not been called, or `close()` already ran.
    #[error("MCP client not started")]
    NotStarted,

    /// A response arrived but did not have the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl McpError {
    /// Create a spawn failed error.
    pub fn spawn_failed(msg: impl Into<String>) -> Self {
        Self::SpawnFailed(msg.into())
    }

    /// Create a transport-died error carrying the stderr tail.
    pub fn transport_died(stderr: impl Into<String>) -> Self {
        Self::TransportDied {
            stderr: stderr.into(),
        }
    }

    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a server error from an error response.
    pub fn server_error(
        code: i64,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self::ServerError {
            code,
            message: message.into(),
            data,
        }
    }

    /// Whether the error means the server process is gone (or never
    /// existed), so trying again against the same client cannot succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::TransportDied { .. } | Self::NotStarted | Self::SpawnFailed(_)
        )
    }

    /// Whether this is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
