//! hud - terminal coding assistant.
//!
//! Main entry point for the hud CLI.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::Style;
use hud_config::HudPaths;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

mod commands;
mod edit;
mod session;
mod spinner;

use commands::{ask, chat, config, mcp};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// hud - chat with an LLM, edit files inside sandboxed roots, call MCP tools
#[derive(Parser)]
#[command(name = "hud")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Chat provider, overriding the active profile
    #[arg(long, global = true)]
    pub provider: Option<String>,

    /// Model, overriding the active profile
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// MCP tool server command line, e.g. "node mcp-server.mjs"
    #[arg(long, global = true, env = "MCP_CMD")]
    pub mcp_cmd: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask a one-shot question
    Ask(ask::AskArgs),

    /// Enter interactive chat mode (REPL, the default)
    Chat(chat::ChatArgs),

    /// Talk to an MCP tool server
    Mcp(mcp::McpArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

const CRATES: [&str; 5] = ["hud", "hud_config", "hud_llm", "hud_mcp", "hud_ops"];

fn crate_filter(level: &str, fallback: &str) -> String {
    let mut parts: Vec<String> = CRATES.iter().map(|c| format!("{c}={level}")).collect();
    parts.push(fallback.to_string());
    parts.join(",")
}

/// Console (human-readable, stderr) plus a daily JSON file under `<home>/logs`.
fn init_logging(paths: &HudPaths, verbose: bool) -> WorkerGuard {
    // RUST_LOG wins over --verbose.
    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new(crate_filter("debug", "warn"))
        } else {
            EnvFilter::new("warn")
        }
    });

    let file_appender = tracing_appender::rolling::daily(paths.log_dir(), "hud.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new(crate_filter("debug", "info"))),
        )
        .init();

    guard
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let red = Style::new().red();

    let paths = match HudPaths::discover().and_then(|paths| paths.ensure_home().map(|_| paths)) {
        Ok(paths) => paths,
        Err(e) => {
            eprintln!("{} {}", red.apply_to("Error:"), e);
            return ExitCode::from(2);
        }
    };
    let _guard = init_logging(&paths, cli.verbose);
    tracing::debug!(home = %paths.home().display(), "resolved hud home");

    let ctx = commands::Context {
        paths,
        verbose: cli.verbose,
        provider: cli.provider,
        model: cli.model,
        mcp_cmd: cli.mcp_cmd.filter(|c| !c.trim().is_empty()),
    };

    let result = match cli.command {
        Some(Commands::Ask(args)) => ask::run(args, &ctx).await,
        Some(Commands::Chat(args)) => chat::run(args, &ctx).await,
        None => chat::run(chat::ChatArgs::default(), &ctx).await,
        Some(Commands::Mcp(args)) => mcp::run(args, &ctx).await,
        Some(Commands::Config(args)) => config::run(args, &ctx).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = %format!("{e:#}"), "command failed");
            eprintln!("{} {:#}", red.apply_to("Error:"), e);
            ExitCode::from(commands::exit_code(&e))
        }
    }
}
