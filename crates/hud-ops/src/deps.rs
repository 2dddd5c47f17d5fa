//! Dependency manifest detection and install suggestions.

use std::fmt;
use std::path::{Path, PathBuf};

/// Package manager a manifest belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManifestKind {
    Pip,
    Poetry,
    Npm,
    Pnpm,
    Yarn,
}

impl ManifestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pip => "pip",
            Self::Poetry => "poetry",
            Self::Npm => "npm",
            Self::Pnpm => "pnpm",
            Self::Yarn => "yarn",
        }
    }
}

impl fmt::Display for ManifestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Checked in this order.
const MANIFESTS: &[(&str, ManifestKind)] = &[
    ("requirements.txt", ManifestKind::Pip),
    ("pyproject.toml", ManifestKind::Poetry),
    ("package.json", ManifestKind::Npm),
    ("pnpm-lock.yaml", ManifestKind::Pnpm),
    ("yarn.lock", ManifestKind::Yarn),
];

/// A manifest file found in a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub kind: ManifestKind,
    pub path: PathBuf,
}

/// Look for known manifests directly under `base`.
pub fn detect(base: impl AsRef<Path>) -> Vec<Detection> {
    let base = base.as_ref();
    MANIFESTS
        .iter()
        .map(|(file, kind)| (base.join(file), *kind))
        .filter(|(path, _)| path.exists())
        .map(|(path, kind)| Detection { kind, path })
        .collect()
}

/// Install commands for the detected manifests.
///
/// `npm install` is only offered when no pnpm or yarn lockfile is present.
pub fn suggest_commands(detections: &[Detection]) -> Vec<String> {
    let has = |kind: ManifestKind| detections.iter().any(|d| d.kind == kind);

    let mut cmds = Vec::new();
    if has(ManifestKind::Pip) {
        cmds.push(
            "python -m venv .venv && . .venv/bin/activate && pip install -r requirements.txt"
                .to_string(),
        );
    }
    if has(ManifestKind::Poetry) {
        cmds.push("poetry install".to_string());
    }
    if has(ManifestKind::Npm) && !has(ManifestKind::Pnpm) && !has(ManifestKind::Yarn) {
        cmds.push("npm install".to_string());
    }
    if has(ManifestKind::Pnpm) {
        cmds.push("pnpm install".to_string());
    }
    if has(ManifestKind::Yarn) {
        cmds.push("yarn install".to_string());
    }
    cmds
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, names: &[&str]) {
        for name in names {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
    }

    fn kinds(d: &[Detection]) -> Vec<ManifestKind> {
        d.iter().map(|d| d.kind).collect()
    }

    #[test]
    fn test_empty_dir() {
        let dir = TempDir::new().unwrap();
        assert!(detect(dir.path()).is_empty());
        assert!(suggest_commands(&[]).is_empty());
    }

    #[test]
    fn test_python_project() {
        let dir = TempDir::new().unwrap();
        touch(&dir, &["pyproject.toml", "requirements.txt"]);

        let found = detect(dir.path());
        assert_eq!(kinds(&found), [ManifestKind::Pip, ManifestKind::Poetry]);
        assert_eq!(found[1].path, dir.path().join("pyproject.toml"));

        let cmds = suggest_commands(&found);
        assert_eq!(cmds.len(), 2);
        assert!(cmds[0].ends_with("pip install -r requirements.txt"));
        assert_eq!(cmds[1], "poetry install");
    }

    #[test]
    fn test_plain_npm() {
        let dir = TempDir::new().unwrap();
        touch(&dir, &["package.json"]);
        assert_eq!(suggest_commands(&detect(dir.path())), ["npm install"]);
    }

    #[test]
    fn test_lockfile_replaces_npm() {
        let dir = TempDir::new().unwrap();
        touch(&dir, &["package.json", "yarn.lock"]);
        assert_eq!(suggest_commands(&detect(dir.path())), ["yarn install"]);

        touch(&dir, &["pnpm-lock.yaml"]);
        assert_eq!(
            suggest_commands(&detect(dir.path())),
            ["pnpm install", "yarn install"]
        );
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ManifestKind::Pnpm.to_string(), "pnpm");
    }
}
