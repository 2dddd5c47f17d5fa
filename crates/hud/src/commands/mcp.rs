//! MCP tool server commands.
//!
//! - `hud mcp tools` - spawn the server, list its tools, shut it down
//! - `hud mcp call <tool> [json]` - spawn the server, call one tool
//!
//! The server command comes from `--mcp-cmd` or `$MCP_CMD`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result, anyhow};
use clap::{Args, Subcommand};
use hud_mcp::{McpClient, McpServerConfig, ToolInfo, tool_result_is_error, tool_result_text};
use serde_json::Value;

use super::{Context, UsageError};

/// MCP commands.
#[derive(Args, Debug)]
pub struct McpArgs {
    /// Per-request timeout in seconds
    #[arg(long, default_value = "15")]
    pub timeout: u64,

    #[command(subcommand)]
    pub command: McpCommand,
}

#[derive(Subcommand, Debug)]
pub enum McpCommand {
    /// List the server's tools
    Tools,

    /// Call a tool
    Call {
        /// Tool name
        tool: String,

        /// Arguments as a JSON object
        args: Option<String>,
    },
}

/// Run the MCP command.
pub async fn run(args: McpArgs, ctx: &Context) -> Result<()> {
    let command_line = ctx
        .mcp_cmd
        .as_deref()
        .ok_or_else(|| UsageError::new("No MCP server command. Pass --mcp-cmd or set MCP_CMD."))?;

    // Validate arguments before spawning anything.
    let call = match &args.command {
        McpCommand::Tools => None,
        McpCommand::Call { tool, args } => Some((tool.clone(), parse_tool_args(args.as_deref())?)),
    };

    let server = ToolServer::spawn(command_line, Duration::from_secs(args.timeout)).await?;
    let result = match call {
        None => server.list_tools().await.map(|tools| print_tools(&tools)),
        Some((tool, arguments)) => server.call_tool(&tool, arguments).await.and_then(|result| {
            print_tool_result(&result)?;
            if tool_result_is_error(&result) {
                return Err(anyhow!("tool '{tool}' reported an error"));
            }
            Ok(())
        }),
    };
    server.close().await;
    result
}

/// Parse `/mcp.call` style JSON arguments. Blank means no arguments.
pub fn parse_tool_args(raw: Option<&str>) -> Result<Option<Value>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(text) => serde_json::from_str(text)
            .map(Some)
            .map_err(|e| UsageError::new(format!("Invalid JSON arguments: {e}"))),
    }
}

pub fn print_tools(tools: &[ToolInfo]) {
    if tools.is_empty() {
        println!("(no tools)");
        return;
    }
    for tool in tools {
        match &tool.description {
            Some(description) => println!("- {}: {}", tool.name, description),
            None => println!("- {}", tool.name),
        }
    }
}

pub fn print_tool_result(result: &Value) -> Result<()> {
    match tool_result_text(result) {
        Some(text) => println!("{text}"),
        None => println!("{}", serde_json::to_string_pretty(result)?),
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// ToolServer
// ─────────────────────────────────────────────────────────────────────────────

/// An async handle on a blocking [`McpClient`].
///
/// Every client call runs on the blocking pool so the runtime keeps going
/// while a request waits for its response.
#[derive(Clone)]
pub struct ToolServer {
    client: Arc<McpClient>,
}

impl ToolServer {
    /// Spawn the server and attempt the MCP handshake.
    ///
    /// A failed handshake is logged and ignored; some servers only speak
    /// the tool methods.
    pub async fn spawn(command_line: &str, timeout: Duration) -> Result<Self> {
        let config = McpServerConfig::from_command_line("mcp", command_line)
            .ok_or_else(|| UsageError::new("MCP server command is empty"))?
            .with_timeout(timeout);
        let server = Self {
            client: Arc::new(McpClient::new(config)),
        };

        server
            .blocking(|client| client.start())
            .await
            .with_context(|| format!("starting MCP server `{command_line}`"))?;

        if let Err(e) = server.blocking(|client| client.initialize()).await {
            tracing::warn!(error = %e, "MCP initialize failed, continuing without handshake");
        }
        Ok(server)
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        self.blocking(|client| client.list_tools())
            .await
            .context("tools/list failed")
    }

    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> Result<Value> {
        let tool = name.to_string();
        self.blocking(move |client| client.call_tool(&tool, arguments))
            .await
            .with_context(|| format!("tools/call {name} failed"))
    }

    pub fn is_running(&self) -> bool {
        self.client.is_running()
    }

    pub async fn close(&self) {
        if let Err(e) = self
            .blocking(|client| {
                client.close();
                Ok(())
            })
            .await
        {
            tracing::warn!(error = %e, "MCP shutdown task failed");
        }
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&McpClient) -> hud_mcp::Result<T> + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        let result = tokio::task::spawn_blocking(move || op(&client))
            .await
            .context("MCP worker task panicked")?;
        Ok(result?)
    }
}
