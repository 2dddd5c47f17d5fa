//! Ask command - one-shot chat completion.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::Args;
use console::Style;
use futures::StreamExt;
use hud_llm::{ChatMessage, ChatOptions, StreamEvent};
use serde::Deserialize;

use super::{Context, UsageError};
use crate::spinner::Spinner;

/// Arguments for the ask command.
#[derive(Args, Debug)]
pub struct AskArgs {
    /// The prompt to send
    #[arg(long)]
    pub prompt: Option<String>,

    /// JSON file with the conversation: a list of messages or {"messages": [...]}
    #[arg(long)]
    pub messages_file: Option<PathBuf>,

    /// System prompt placed before the conversation
    #[arg(long)]
    pub system: Option<String>,

    /// Print the reply as it arrives
    #[arg(long)]
    pub stream: bool,

    /// Sampling temperature
    #[arg(long, default_value = "0.2")]
    pub temp: f32,

    /// Completion token budget
    #[arg(long, default_value = "512")]
    pub max_tokens: u32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MessagesFile {
    List(Vec<ChatMessage>),
    Wrapped { messages: Vec<ChatMessage> },
}

/// Read a messages file.
pub fn read_messages_file(path: &Path) -> Result<Vec<ChatMessage>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading messages file {}", path.display()))?;
    let parsed: MessagesFile = serde_json::from_str(&text).map_err(|e| {
        UsageError::new(format!("Invalid messages file {}: {e}", path.display()))
    })?;
    Ok(match parsed {
        MessagesFile::List(messages) | MessagesFile::Wrapped { messages } => messages,
    })
}

/// The conversation for a one-shot ask.
///
/// A messages file takes precedence over `--prompt`.
pub fn build_messages(args: &AskArgs) -> Result<Vec<ChatMessage>> {
    let mut messages = Vec::new();
    if let Some(system) = &args.system {
        messages.push(ChatMessage::system(system.clone()));
    }
    match (&args.messages_file, &args.prompt) {
        (Some(path), _) => messages.extend(read_messages_file(path)?),
        (None, Some(prompt)) => messages.push(ChatMessage::user(prompt.clone())),
        (None, None) => {
            return Err(UsageError::new("Nothing to ask. Pass --prompt or --messages-file."));
        }
    }
    Ok(messages)
}

/// Run the ask command.
pub async fn run(args: AskArgs, ctx: &Context) -> Result<()> {
    let messages = build_messages(&args)?;
    let mut config = ctx.load_config()?;
    let provider = ctx.make_provider(&mut config)?;
    let options = ChatOptions::default()
        .with_temperature(args.temp)
        .with_max_tokens(args.max_tokens);

    tracing::info!(
        provider = provider.name(),
        model = provider.model(),
        messages = messages.len(),
        stream = args.stream,
        "sending one-shot request"
    );

    if args.stream {
        let mut stream = provider.chat_stream(&messages, &options).await?;
        let mut usage = None;
        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::Delta(text) => {
                    print!("{text}");
                    std::io::stdout().flush()?;
                }
                StreamEvent::Usage(value) => usage = Some(value),
            }
        }
        println!();
        if let (true, Some(usage)) = (ctx.verbose, usage) {
            let dim = Style::new().dim();
            eprintln!("{}", dim.apply_to(format!("usage: {usage}")));
        }
    } else {
        let spinner = Spinner::start("Waiting for reply...");
        let result = provider.chat(&messages, &options).await;
        spinner.finish();
        let response = result?;
        println!("{}", response.text);
        if ctx.verbose {
            let dim = Style::new().dim();
            eprintln!("{}", dim.apply_to(format!("usage: {}", response.usage)));
        }
    }

    Ok(())
}
