//! Conversation state for the REPL: system prompt, attachments and history.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use hud_llm::ChatMessage;

/// How many history messages accompany each chat turn.
pub const HISTORY_WINDOW: usize = 20;

/// Largest file `/attach` and `/read` accept.
pub const MAX_ATTACH_BYTES: u64 = 300_000;

/// Extensions treated as text. Files without an extension are allowed.
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "py", "json", "yaml", "yml", "toml", "js", "ts", "html", "css", "sh", "bat",
    "ps1", "sql", "csv", "rs",
];

/// State carried between REPL turns.
#[derive(Debug, Default)]
pub struct ChatSession {
    system: Option<String>,
    attachments: Vec<(String, String)>,
    history: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(system: Option<String>) -> Self {
        Self {
            system,
            ..Self::default()
        }
    }

    pub fn system(&self) -> Option<&str> {
        self.system.as_deref()
    }

    pub fn set_system(&mut self, text: impl Into<String>) {
        self.system = Some(text.into());
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Attach a file's content, replacing an earlier attachment of the same path.
    pub fn attach(&mut self, path: impl Into<String>, content: String) {
        let path = path.into();
        match self.attachments.iter_mut().find(|(p, _)| *p == path) {
            Some(slot) => slot.1 = content,
            None => self.attachments.push((path, content)),
        }
    }

    /// Remove an attachment. Returns whether it was attached.
    pub fn detach(&mut self, path: &str) -> bool {
        let before = self.attachments.len();
        self.attachments.retain(|(p, _)| p != path);
        self.attachments.len() != before
    }

    /// Attached paths with their sizes in bytes, in attach order.
    pub fn attachments(&self) -> impl Iterator<Item = (&str, usize)> {
        self.attachments.iter().map(|(p, c)| (p.as_str(), c.len()))
    }

    /// The conversation sent for `prompt`: system prompt, one user message
    /// per attachment, the recent history, then the prompt itself.
    pub fn build_messages(&self, prompt: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::new();
        if let Some(system) = &self.system {
            messages.push(ChatMessage::system(system.clone()));
        }
        for (path, content) in &self.attachments {
            messages.push(ChatMessage::user(format!("[file:{path}]\n{content}")));
        }
        let skip = self.history.len().saturating_sub(HISTORY_WINDOW);
        messages.extend(self.history[skip..].iter().cloned());
        messages.push(ChatMessage::user(prompt));
        messages
    }

    /// Record a completed exchange.
    pub fn record_turn(&mut self, prompt: &str, reply: &str) {
        self.history.push(ChatMessage::user(prompt));
        self.history.push(ChatMessage::assistant(reply));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Local file helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Read a small text file for attaching or previewing.
///
/// Unlike sandboxed reads this is not confined to roots; it refuses files
/// with a non-text extension or larger than [`MAX_ATTACH_BYTES`].
pub fn read_attachment(path: &Path) -> Result<String> {
    if !path.exists() {
        bail!("File not found: {}", path.display());
    }
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        if !TEXT_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
            bail!("Refusing non-text file (.{ext})");
        }
    }
    let bytes = std::fs::read(path)?;
    if bytes.len() as u64 > MAX_ATTACH_BYTES {
        bail!("File too large ({} bytes) > {}", bytes.len(), MAX_ATTACH_BYTES);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Sorted entry names of a directory, directories suffixed with `/`.
pub fn list_dir(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        bail!("Path not found: {}", path.display());
    }
    let mut names: Vec<(PathBuf, String)> = std::fs::read_dir(path)?
        .filter_map(|entry| entry.ok())
        .map(|entry| {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.path().is_dir() {
                name.push('/');
            }
            (entry.path(), name)
        })
        .collect();
    names.sort();
    Ok(names.into_iter().map(|(_, name)| name).collect())
}
