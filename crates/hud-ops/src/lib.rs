//! Local operations for hud: sandboxed file access, diffs, git and shell
//! wrappers, the audit log and dependency detection.

pub mod audit;
pub mod deps;
pub mod diff;
pub mod error;
pub mod git;
pub mod sandbox;
pub mod shell;

pub use audit::AuditLog;
pub use deps::{Detection, ManifestKind, detect, suggest_commands};
pub use diff::unified_diff;
pub use error::{OpsError, Result};
pub use sandbox::{Sandbox, is_in_roots, normalize};
pub use shell::CommandOutput;
