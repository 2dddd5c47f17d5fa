//! Append-only audit trail of file writes, applied edits and commands run.
//!
//! One tab-separated line per event:
//!
//! ```text
//! 2026-03-01T12:00:00Z	write	/srv/app/notes.md	12 bytes
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::{OpsError, Result};

/// Writer for the audit log file.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event stamped with the current UTC time.
    pub fn record(&self, event: &str, path: Option<&str>, detail: &str) -> Result<()> {
        self.record_at(Utc::now(), event, path, detail)
    }

    fn record_at(&self, at: DateTime<Utc>, event: &str, path: Option<&str>, detail: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| OpsError::io(parent, e))?;
        }

        let line = format_line(at, event, path, detail);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| OpsError::io(&self.path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| OpsError::io(&self.path, e))?;

        tracing::debug!(event, path = path.unwrap_or(""), "audit event recorded");
        Ok(())
    }
}

fn format_line(at: DateTime<Utc>, event: &str, path: Option<&str>, detail: &str) -> String {
    format!(
        "{}\t{}\t{}\t{}\n",
        at.format("%Y-%m-%dT%H:%M:%SZ"),
        event,
        path.unwrap_or(""),
        detail
    )
}
