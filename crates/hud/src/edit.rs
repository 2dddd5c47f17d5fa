//! LLM-driven file rewrites for `/edit`.

use anyhow::{Result, bail};
use hud_llm::{ChatMessage, ChatOptions, ChatProvider};
use hud_ops::unified_diff;

const EDIT_SYSTEM_PROMPT: &str = "You are a meticulous code editor. When given a file's current \
text and a user instruction, return ONLY the fully rewritten file content. Do not include \
explanations or code fences.";

/// A rewrite the model proposed, with its diff against the current text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditProposal {
    pub new_text: String,
    /// Empty when the model returned the file unchanged.
    pub patch: String,
}

impl EditProposal {
    pub fn is_noop(&self) -> bool {
        self.patch.trim().is_empty()
    }
}

/// Ask `provider` to rewrite `old` following `instruction`.
pub async fn propose_edit(
    provider: &dyn ChatProvider,
    path: &str,
    old: &str,
    instruction: &str,
) -> Result<EditProposal> {
    let messages = [
        ChatMessage::system(EDIT_SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "FILEPATH: {path}\n---BEGIN FILE---\n{old}\n---END FILE---\nINSTRUCTION: {instruction}"
        )),
    ];
    // Leave room for the whole file plus some growth.
    let max_tokens = u32::try_from(old.len() / 2 + 1200).unwrap_or(u32::MAX);
    let options = ChatOptions::default()
        .with_temperature(0.1)
        .with_max_tokens(max_tokens);

    let reply = provider.chat(&messages, &options).await?;
    if reply.text.trim().is_empty() {
        bail!("Model returned empty content; no changes applied.");
    }

    tracing::debug!(path, bytes = reply.text.len(), "received rewrite");
    Ok(EditProposal {
        patch: unified_diff(old, &reply.text, path),
        new_text: reply.text,
    })
}
