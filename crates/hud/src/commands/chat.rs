//! Chat command - interactive REPL mode.

use anyhow::Result;
use clap::Args;

use super::Context;
use super::repl::Repl;

/// Arguments for the chat command.
#[derive(Args, Debug, Default)]
pub struct ChatArgs {
    /// Initial system prompt
    #[arg(long)]
    pub system: Option<String>,
}

/// Run the chat command (REPL).
pub async fn run(args: ChatArgs, ctx: &Context) -> Result<()> {
    let mut repl = Repl::new(ctx.clone(), args.system).await?;
    let result = repl.run().await;
    repl.shutdown().await;
    result
}
