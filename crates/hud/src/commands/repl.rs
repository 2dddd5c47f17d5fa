//! REPL (Read-Eval-Print Loop) implementation for interactive chat.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use console::{Style, style};
use futures::StreamExt;
use hud_config::HudConfig;
use hud_llm::{ChatOptions, SharedProvider, StreamEvent};
use hud_mcp::DEFAULT_REQUEST_TIMEOUT;
use hud_ops::{Sandbox, git, shell};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use serde_json::Value;

use super::Context;
use super::mcp::{ToolServer, parse_tool_args, print_tool_result, print_tools};
use crate::edit::propose_edit;
use crate::session::{ChatSession, list_dir, read_attachment};
use crate::spinner::Spinner;

/// Default commit message for `/commit`.
const DEFAULT_COMMIT_MESSAGE: &str = "chore: HUD apply";

/// Characters shown by `/read`.
const PREVIEW_CHARS: usize = 1000;

/// Completion budget for chat turns.
const CHAT_MAX_TOKENS: u32 = 800;

/// REPL state and configuration.
pub struct Repl {
    ctx: Context,
    config: HudConfig,
    session: ChatSession,
    provider: Option<SharedProvider>,
    provider_error: Option<String>,
    mcp: Option<ToolServer>,
    mcp_status: Option<String>,
    editor: Editor<(), DefaultHistory>,
}

impl Repl {
    /// Load config, build the provider and spawn the MCP server if one is
    /// configured.
    pub async fn new(ctx: Context, system: Option<String>) -> Result<Self> {
        let config = ctx.load_config()?;
        let editor = Editor::with_config(
            Config::builder()
                .history_ignore_space(true)
                .auto_add_history(true)
                .build(),
        )?;

        let mut repl = Self {
            ctx,
            config,
            session: ChatSession::new(system),
            provider: None,
            provider_error: None,
            mcp: None,
            mcp_status: None,
            editor,
        };
        repl.rebuild_provider();
        repl.start_mcp().await;
        Ok(repl)
    }

    fn rebuild_provider(&mut self) {
        match self.ctx.make_provider(&mut self.config) {
            Ok(provider) => {
                self.provider = Some(provider);
                self.provider_error = None;
            }
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "chat provider unavailable");
                self.provider = None;
                self.provider_error = Some(format!("{e:#}"));
            }
        }
    }

    async fn start_mcp(&mut self) {
        let Some(command_line) = self.ctx.mcp_cmd.clone() else {
            return;
        };
        match ToolServer::spawn(&command_line, DEFAULT_REQUEST_TIMEOUT).await {
            Ok(server) => {
                let status = match server.list_tools().await {
                    Ok(tools) if tools.is_empty() => "spawned, tools: (none)".to_string(),
                    Ok(tools) => {
                        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
                        format!("spawned, tools: {}", names.join(", "))
                    }
                    Err(e) => format!("spawned, tools: (error listing: {e:#})"),
                };
                self.mcp = Some(server);
                self.mcp_status = Some(status);
            }
            Err(e) => self.mcp_status = Some(format!("not started: {e:#}")),
        }
    }

    /// Stop the MCP server, if any.
    pub async fn shutdown(&mut self) {
        if let Some(server) = self.mcp.take() {
            server.close().await;
        }
    }

    /// Run the REPL loop.
    pub async fn run(&mut self) -> Result<()> {
        self.print_welcome();

        loop {
            let prompt = format!("{} ", style("hud>").cyan().bold());
            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    if line.starts_with('/') {
                        match self.handle_slash_command(line).await {
                            Ok(ControlFlow::Continue) => continue,
                            Ok(ControlFlow::Exit) => break,
                            Err(e) => {
                                self.print_error(&format!("{e:#}"));
                                continue;
                            }
                        }
                    }

                    if let Err(e) = self.send_message(line).await {
                        self.print_error(&format!("{e:#}"));
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!();
                    self.print_dim("(Interrupted - type /quit to exit)");
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(e) => {
                    self.print_error(&format!("Input error: {}", e));
                    break;
                }
            }
        }

        self.print_dim("Bye.");
        Ok(())
    }

    /// Send a chat turn and stream the reply.
    async fn send_message(&mut self, message: &str) -> Result<()> {
        let Some(provider) = self.provider.clone() else {
            let reason = self.provider_error.as_deref().unwrap_or("no provider");
            self.print_warning(&format!(
                "Provider not configured ({reason}); only local and MCP commands will work."
            ));
            return Ok(());
        };

        let messages = self.session.build_messages(message);
        let options = ChatOptions::default().with_max_tokens(CHAT_MAX_TOKENS);
        let mut stream = provider.chat_stream(&messages, &options).await?;

        print!("{} ", style("Assistant:").magenta().bold());
        let mut reply = String::new();
        while let Some(event) = stream.next().await {
            match event {
                Ok(StreamEvent::Delta(text)) => {
                    print!("{text}");
                    std::io::stdout().flush()?;
                    reply.push_str(&text);
                }
                Ok(StreamEvent::Usage(usage)) => {
                    tracing::debug!(%usage, "chat turn usage");
                }
                Err(e) => {
                    println!();
                    return Err(e.into());
                }
            }
        }
        println!();
        println!();

        self.session.record_turn(message, &reply);
        Ok(())
    }

    /// Handle a slash command.
    async fn handle_slash_command(&mut self, input: &str) -> Result<ControlFlow> {
        let (cmd, rest) = split_command(input);

        match cmd {
            "quit" | "exit" | "q" => return Ok(ControlFlow::Exit),
            "help" | "h" | "?" => self.print_help(),
            "status" => self.print_status().await,
            "roots" => self.cmd_roots(rest)?,
            "profile" => self.cmd_profile(rest)?,
            "open" => self.cmd_open(rest)?,
            "write" => self.cmd_write(rest)?,
            "diff" => self.cmd_diff(rest).await,
            "commit" => self.cmd_commit(rest).await,
            "revert" => self.cmd_revert(rest).await,
            "edit" => self.cmd_edit(rest).await?,
            "exec" => self.cmd_exec(rest).await?,
            "deps" => self.cmd_deps().await?,
            "system" if !rest.is_empty() => {
                self.session.set_system(rest);
                self.print_ok("system prompt set.");
            }
            "pwd" => println!("{}", std::env::current_dir()?.display()),
            "ls" => {
                let dir = if rest.is_empty() { PathBuf::from(".") } else { PathBuf::from(rest) };
                let names = list_dir(&dir)?;
                if names.is_empty() {
                    println!("(empty)");
                }
                for name in names {
                    println!("{name}");
                }
            }
            "read" if !rest.is_empty() => {
                let content = read_attachment(Path::new(rest))?;
                self.print_rule(&format!("Preview: {rest}"));
                println!("{}", content.chars().take(PREVIEW_CHARS).collect::<String>());
            }
            "attach" if !rest.is_empty() => {
                let content = read_attachment(Path::new(rest))?;
                let bytes = content.len();
                self.session.attach(rest, content);
                self.print_ok(&format!("attached {rest} ({bytes} bytes)"));
            }
            "attachments" => {
                let mut any = false;
                for (path, bytes) in self.session.attachments() {
                    println!("- {path} [{bytes} bytes]");
                    any = true;
                }
                if !any {
                    println!("(no attachments)");
                }
            }
            "detach" if !rest.is_empty() => {
                if self.session.detach(rest) {
                    self.print_ok(&format!("detached {rest}"));
                } else {
                    println!("(not attached) {rest}");
                }
            }
            "clear" => {
                self.session.clear_history();
                self.print_ok("history cleared.");
            }
            "mcp.tools" => self.cmd_mcp_tools().await,
            "mcp.call" => self.cmd_mcp_call(rest).await?,
            "" => self.print_dim("Type /help for available commands"),
            "system" | "read" | "attach" | "detach" => {
                self.print_error(&format!("Usage: /{cmd} <{}>", usage_arg(cmd)));
            }
            _ => {
                self.print_error(&format!("Unknown command: /{}", cmd));
                self.print_dim("Type /help for available commands");
            }
        }

        Ok(ControlFlow::Continue)
    }

    // ── Profile and roots ───────────────────────────────────────────────────

    fn sandbox(&mut self) -> Sandbox {
        Sandbox::new(self.config.active_profile().root_paths())
    }

    fn cmd_roots(&mut self, args: &str) -> Result<()> {
        let (action, path) = split_first_word(args);
        match action {
            "" | "list" => {
                let roots = &self.config.active_profile().roots;
                if roots.is_empty() {
                    println!("(no roots)");
                }
                for root in roots {
                    println!("- {root}");
                }
            }
            "add" if !path.is_empty() => {
                let added = self.config.ensure_root(path)?;
                self.ctx.save_config(&self.config)?;
                println!("added root: {}", added.display());
            }
            _ => println!("Usage: /roots [list|add <path>]"),
        }
        Ok(())
    }

    fn cmd_profile(&mut self, name: &str) -> Result<()> {
        if name.is_empty() {
            for profile in self.config.profiles.keys() {
                let marker = if *profile == self.config.active_profile { "*" } else { " " };
                println!("{marker} {profile}");
            }
            return Ok(());
        }

        self.config.set_active_profile(name);
        self.ctx.save_config(&self.config)?;
        self.rebuild_provider();
        self.print_ok(&format!("switched to profile {name}"));
        Ok(())
    }

    // ── Files ───────────────────────────────────────────────────────────────

    fn cmd_open(&mut self, path: &str) -> Result<()> {
        if path.is_empty() {
            println!("Usage: /open <path>");
            return Ok(());
        }
        let text = self.sandbox().read_text(path)?;
        self.print_rule(path);
        println!("{text}");
        Ok(())
    }

    fn cmd_write(&mut self, args: &str) -> Result<()> {
        let (path, payload) = split_first_word(args);
        if path.is_empty() || payload.is_empty() {
            println!("Usage: /write <path> {{\"content\": \"...\"}}");
            return Ok(());
        }
        let content = parse_write_payload(payload)?;
        let written = self.sandbox().write_text(path, &content)?;
        self.audit("write", Some(&written.display().to_string()), &format!("{} bytes", content.len()));
        println!("{} {} ({} bytes)", style("wrote").green(), path, content.len());
        Ok(())
    }

    async fn cmd_edit(&mut self, args: &str) -> Result<()> {
        let (path, instruction) = split_first_word(args);
        if path.is_empty() || instruction.is_empty() {
            println!("Usage: /edit <path> <instruction...>");
            return Ok(());
        }
        let sandbox = self.sandbox();
        let old = sandbox.read_text(path)?;
        let provider = self
            .provider
            .clone()
            .ok_or_else(|| anyhow!("no chat provider: {}", self.provider_error.as_deref().unwrap_or("unknown")))?;

        let spinner = Spinner::start("Asking for a rewrite...");
        let proposal = propose_edit(provider.as_ref(), path, &old, instruction).await;
        spinner.finish();
        let proposal = proposal?;

        self.print_rule(&format!("Proposed diff for {path}"));
        if proposal.is_noop() {
            println!("(no changes)");
            return Ok(());
        }
        print_diff(&proposal.patch);

        if self.confirm("Apply this patch?")? {
            let written = sandbox.write_text(path, &proposal.new_text)?;
            self.audit("edit-apply", Some(&written.display().to_string()), "applied diff");
            println!("{}  Use /commit <msg> to commit.", style("Applied.").green());
        }
        Ok(())
    }

    // ── Git ─────────────────────────────────────────────────────────────────

    async fn cmd_diff(&self, path: &str) {
        if path.is_empty() {
            println!("Usage: /diff <path>");
            return;
        }
        let out = git::diff(path, None).await;
        if out.trim().is_empty() {
            println!("(no changes)");
        } else {
            print_diff(&out);
        }
    }

    async fn cmd_commit(&self, message: &str) {
        let message = if message.is_empty() { DEFAULT_COMMIT_MESSAGE } else { message };
        print!("{}", git::add_all(None).await);
        print!("{}", git::commit(message, None).await);
    }

    async fn cmd_revert(&self, path: &str) {
        if path.is_empty() {
            println!("Usage: /revert <path>");
            return;
        }
        print!("{}", git::revert(path, None).await);
    }

    // ── Commands ────────────────────────────────────────────────────────────

    async fn cmd_exec(&mut self, command: &str) -> Result<()> {
        if command.is_empty() {
            println!("Usage: /exec <command>");
            return Ok(());
        }
        if !self.confirm(&format!("Run shell command?\n  {}\n", style(command).bold()))? {
            println!("Aborted.");
            return Ok(());
        }

        let out = shell::run(command, None, shell::DEFAULT_TIMEOUT).await;
        self.print_command_output(&format!("exit={}", out.code), &out);
        self.audit("exec", None, &format!("code={} {}", out.code, command));
        Ok(())
    }

    async fn cmd_deps(&mut self) -> Result<()> {
        let found = hud_ops::detect(".");
        if found.is_empty() {
            println!("No dependency files detected.");
            return Ok(());
        }
        self.print_rule("Detected dependency manifests");
        for detection in &found {
            println!("- {}: {}", detection.kind, detection.path.display());
        }

        let commands = hud_ops::suggest_commands(&found);
        if commands.is_empty() {
            println!("No install commands suggested.");
        }
        for command in commands {
            if !self.confirm(&format!("Run: {command} ?"))? {
                continue;
            }
            let out = shell::run(&command, None, shell::DEFAULT_TIMEOUT).await;
            self.print_command_output(&format!("{command} -> exit {}", out.code), &out);
            self.audit("deps-run", None, &command);
        }
        Ok(())
    }

    // ── MCP ─────────────────────────────────────────────────────────────────

    fn mcp_server(&self) -> Option<ToolServer> {
        if self.mcp.is_none() {
            self.print_warning("MCP not running. Pass --mcp-cmd or set MCP_CMD.");
        }
        self.mcp.clone()
    }

    async fn cmd_mcp_tools(&self) {
        let Some(server) = self.mcp_server() else {
            return;
        };
        match server.list_tools().await {
            Ok(tools) => print_tools(&tools),
            Err(e) => self.print_error(&format!("{e:#}")),
        }
    }

    async fn cmd_mcp_call(&self, args: &str) -> Result<()> {
        let Some(server) = self.mcp_server() else {
            return Ok(());
        };
        let (tool, json) = split_first_word(args);
        if tool.is_empty() {
            println!("Usage: /mcp.call <tool> {{json args}}");
            return Ok(());
        }
        let arguments = parse_tool_args(Some(json))?;
        match server.call_tool(tool, arguments).await {
            Ok(result) => print_tool_result(&result)?,
            Err(e) => self.print_error(&format!("{e:#}")),
        }
        Ok(())
    }

    // ── Output helpers ──────────────────────────────────────────────────────

    fn confirm(&mut self, question: &str) -> Result<bool> {
        match self.editor.readline(&format!("{question} [y/N] ")) {
            Ok(answer) => Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")),
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn audit(&self, event: &str, path: Option<&str>, detail: &str) {
        if let Err(e) = self.ctx.audit().record(event, path, detail) {
            tracing::warn!(event, error = %e, "failed to write audit log");
            self.print_dim(&format!("(audit log not written: {e})"));
        }
    }

    fn print_welcome(&mut self) {
        let dim = Style::new().dim();
        println!();
        println!("{}", style("hud").bold().cyan());
        println!("{}", dim.apply_to("─".repeat(40)));
        self.print_summary();
        println!(
            "{}",
            dim.apply_to("Type a message to chat. /help for commands, Ctrl+D to exit.")
        );
        println!();
        if self.provider.is_none() {
            self.print_warning("Provider not fully configured. MCP and local commands still work.");
        }
    }

    fn print_summary(&mut self) {
        let label = Style::new().cyan();
        let active = self.config.active_profile.clone();
        let (provider, model) = self.ctx.provider_choice(&mut self.config);
        let roots = self.config.active_profile().roots.clone();

        println!("{:<10} {}", label.apply_to("Profile"), active);
        println!("{:<10} {} @{}", label.apply_to("Provider"), provider, model);
        if roots.is_empty() {
            println!("{:<10} (none) - /roots add <path>", label.apply_to("Roots"));
        } else {
            println!("{:<10} {}", label.apply_to("Roots"), roots.join(", "));
        }
        if let Some(status) = &self.mcp_status {
            println!("{:<10} {}", label.apply_to("MCP"), status);
        }
    }

    async fn print_status(&mut self) {
        let label = Style::new().cyan();
        self.print_summary();
        let in_repo = git::is_repo(None).await;
        println!("{:<10} {}", label.apply_to("Git repo"), if in_repo { "yes" } else { "no" });
        if in_repo {
            let status = git::status(None).await;
            let status = if status.trim().is_empty() { "(clean)" } else { status.trim_end() };
            println!("{:<10} {}", label.apply_to("Git status"), status);
        }
        if let Some(server) = &self.mcp {
            let running = if server.is_running() { "running" } else { "exited" };
            println!("{:<10} {}", label.apply_to("MCP proc"), running);
        }
        if let Some(system) = self.session.system() {
            println!("{:<10} {}", label.apply_to("System"), system);
        }
        println!(
            "{:<10} {} messages",
            label.apply_to("History"),
            self.session.history().len()
        );
    }

    fn print_help(&self) {
        let dim = Style::new().dim();
        let entries = [
            ("/help", "Show this help"),
            ("/exit, /quit", "Exit the REPL"),
            ("/status", "Profile, provider, roots, git and MCP state"),
            ("/roots [list|add <path>]", "Show or add sandbox roots"),
            ("/profile [name]", "List profiles or switch"),
            ("/open <path>", "Print a file inside the roots"),
            ("/write <path> {json}", "Write {\"content\": ...} to a file inside the roots"),
            ("/diff <path>", "git diff for a path"),
            ("/commit [msg]", "git add -A and commit"),
            ("/revert <path>", "Discard working-tree changes to a path"),
            ("/edit <path> <instruction>", "Ask the model to rewrite a file"),
            ("/exec <cmd>", "Run a shell command after confirmation"),
            ("/deps", "Detect manifests and offer install commands"),
            ("/system <text>", "Set the system prompt"),
            ("/pwd, /ls [path]", "Show the working directory or list a directory"),
            ("/read <path>", "Preview a text file"),
            ("/attach <path>", "Send a file with every message"),
            ("/attachments", "List attached files"),
            ("/detach <path>", "Stop sending a file"),
            ("/clear", "Forget the conversation history"),
            ("/mcp.tools", "List MCP tools"),
            ("/mcp.call <tool> {json}", "Call an MCP tool"),
        ];

        println!();
        println!("{}", style("Available Commands").bold());
        println!("{}", dim.apply_to("─".repeat(40)));
        for (command, description) in entries {
            println!("  {:<28} {}", style(command).cyan(), description);
        }
        println!();
    }

    fn print_command_output(&self, title: &str, out: &shell::CommandOutput) {
        self.print_rule(title);
        if !out.stdout.is_empty() {
            print!("{}", out.stdout);
        }
        if !out.stderr.is_empty() {
            print!("{}", style(&out.stderr).red());
        }
    }

    fn print_rule(&self, title: &str) {
        let dim = Style::new().dim();
        println!("{} {} {}", dim.apply_to("──"), title, dim.apply_to("─".repeat(20)));
    }

    fn print_ok(&self, msg: &str) {
        println!("{} {}", style("✓").green(), msg);
    }

    fn print_dim(&self, msg: &str) {
        let dim = Style::new().dim();
        println!("{}", dim.apply_to(msg));
    }

    fn print_warning(&self, msg: &str) {
        println!("{}", style(msg).yellow());
    }

    fn print_error(&self, msg: &str) {
        let red = Style::new().red();
        println!("{} {}", red.apply_to("Error:"), msg);
    }
}

/// Control flow for the REPL.
pub enum ControlFlow {
    Continue,
    Exit,
}

/// Split `/name rest of line` into `("name", "rest of line")`.
fn split_command(input: &str) -> (&str, &str) {
    split_first_word(input.trim().trim_start_matches('/'))
}

/// Split off the first whitespace-delimited word; the remainder is trimmed.
fn split_first_word(input: &str) -> (&str, &str) {
    let input = input.trim();
    match input.split_once(char::is_whitespace) {
        Some((first, rest)) => (first, rest.trim()),
        None => (input, ""),
    }
}

fn usage_arg(cmd: &str) -> &'static str {
    match cmd {
        "system" => "text",
        _ => "path",
    }
}

/// The `content` of a `/write` payload. A payload without it writes an empty file.
fn parse_write_payload(payload: &str) -> Result<String> {
    let value: Value =
        serde_json::from_str(payload).map_err(|e| anyhow!("Invalid JSON payload: {e}"))?;
    match value.get("content") {
        None => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(anyhow!("\"content\" must be a string, got {other}")),
    }
}

fn print_diff(patch: &str) {
    for line in patch.lines() {
        if line.starts_with("+++") || line.starts_with("---") {
            println!("{}", style(line).bold());
        } else if line.starts_with('+') {
            println!("{}", style(line).green());
        } else if line.starts_with('-') {
            println!("{}", style(line).red());
        } else if line.starts_with("@@") {
            println!("{}", style(line).cyan());
        } else {
            println!("{line}");
        }
    }
}
