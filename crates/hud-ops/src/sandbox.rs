//! Root-confined file access.
//!
//! Every read and write is checked against the active profile's roots.
//!
//! # Path model
//!
//! - `~` is expanded and relative paths are joined onto the current directory
//! - `.` and `..` are resolved lexically
//! - Symlinks are resolved for the longest prefix that exists, so a link
//!   pointing out of a root is caught even when the final file is new
//! - Containment is a component-wise prefix check, so `/srv/app2` is not
//!   inside `/srv/app`
//!
//! # Example
//!
//! ```no_run
//! use hud_ops::sandbox::Sandbox;
//!
//! let sandbox = Sandbox::new(["/home/user/project"]);
//! let text = sandbox.read_text("/home/user/project/README.md");
//! assert!(sandbox.read_text("/etc/passwd").is_err());
//! ```

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use crate::error::{OpsError, Result};

/// Largest file `read_text` will load by default.
pub const DEFAULT_MAX_READ_BYTES: u64 = 1024 * 1024;

/// Expand `~`, make absolute, resolve `..` lexically and symlinks on the
/// existing prefix.
pub fn normalize(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let expanded = expand_home(path);
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(&expanded))
            .unwrap_or(expanded)
    };
    resolve_existing_prefix(&lexical_clean(&absolute))
}

/// Whether `path` lies inside any of `roots`. Both sides are normalized.
pub fn is_in_roots<P: AsRef<Path>>(path: impl AsRef<Path>, roots: &[P]) -> bool {
    let path = normalize(path);
    roots.iter().any(|root| path.starts_with(normalize(root)))
}

fn expand_home(path: &Path) -> PathBuf {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "~" => match dirs::home_dir() {
            Some(home) => home.join(components.as_path()),
            None => path.to_path_buf(),
        },
        _ => path.to_path_buf(),
    }
}

fn lexical_clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `pop` stops at the root, so `/..` stays `/`.
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn resolve_existing_prefix(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut missing: Vec<OsString> = Vec::new();

    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut out = canonical;
            for name in missing.iter().rev() {
                out.push(name);
            }
            return out;
        }
        match (existing.file_name(), existing.parent()) {
            (Some(name), Some(parent)) => {
                missing.push(name.to_os_string());
                existing = parent.to_path_buf();
            }
            _ => return path.to_path_buf(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sandbox
// ─────────────────────────────────────────────────────────────────────────────

/// File access confined to a set of root directories.
///
/// With no roots, every path is refused.
#[derive(Debug, Clone)]
pub struct Sandbox {
    roots: Vec<PathBuf>,
    max_read_bytes: u64,
}

impl Sandbox {
    /// Create a sandbox over `roots`, normalizing each.
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self {
            roots: roots.into_iter().map(normalize).collect(),
            max_read_bytes: DEFAULT_MAX_READ_BYTES,
        }
    }

    /// Change the read limit.
    pub fn with_max_read_bytes(mut self, limit: u64) -> Self {
        self.max_read_bytes = limit;
        self
    }

    /// The normalized roots.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Normalize `path` and check it lies inside a root.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let normalized = normalize(path);
        if self.roots.iter().any(|root| normalized.starts_with(root)) {
            Ok(normalized)
        } else {
            tracing::debug!(path = %normalized.display(), "refused path outside roots");
            Err(OpsError::OutsideRoots { path: normalized })
        }
    }

    /// Read a text file inside the roots, decoding invalid UTF-8 lossily.
    pub fn read_text(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = self.resolve(path)?;
        if !path.exists() {
            return Err(OpsError::NotFound(path));
        }

        let size = std::fs::metadata(&path)
            .map_err(|e| OpsError::io(&path, e))?
            .len();
        if size > self.max_read_bytes {
            return Err(OpsError::TooLarge {
                path,
                size,
                limit: self.max_read_bytes,
            });
        }

        let bytes = std::fs::read(&path).map_err(|e| OpsError::io(&path, e))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Write a text file inside the roots, creating parent directories.
    ///
    /// Returns the normalized path written.
    pub fn write_text(&self, path: impl AsRef<Path>, content: &str) -> Result<PathBuf> {
        let path = self.resolve(path)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| OpsError::io(parent, e))?;
        }
        std::fs::write(&path, content).map_err(|e| OpsError::io(&path, e))?;

        tracing::debug!(path = %path.display(), bytes = content.len(), "wrote file");
        Ok(path)
    }
}
