//! MCP (Model Context Protocol) client for hud.
//!
//! This crate owns a tool-server child process and speaks JSON-RPC 2.0 to it
//! over the child's standard streams.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  McpClient                                                  │
//! │  - request(method, params, timeout)                         │
//! │  - initialize, tools/list, tools/call (+ legacy fallbacks)  │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  StdioTransport                                             │
//! │  - child process with piped stdin / stdout / stderr         │
//! │  - stdout reader thread: FrameDecoder -> Inbox              │
//! │  - stderr reader thread: bounded tail of recent lines       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use hud_mcp::{McpClient, McpServerConfig};
//!
//! let config = McpServerConfig::new("playwright", "node").with_arg("mcp-server.mjs");
//! let client = McpClient::new(config);
//! client.start()?;
//!
//! for tool in client.list_tools()? {
//!     println!("{} - {:?}", tool.name, tool.description);
//! }
//!
//! let result = client.call_tool("browse", Some(serde_json::json!({"url": "https://example.com"})))?;
//! println!("{result}");
//!
//! client.close();
//! ```
//!
//! # Wire format
//!
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! {"jsonrpc": "2.0", "id": 1, "method": "...", "params": {...}}
//! ```
//!
//! Responses are matched to callers by id. A response nobody is waiting for
//! (for example one that arrives after its caller timed out) is parked in a
//! bounded ring and never handed to another caller.

pub mod client;
pub mod error;
pub mod framing;
pub mod ids;
pub mod inbox;
pub mod protocol;
pub mod transport;

pub use client::{DEFAULT_REQUEST_TIMEOUT, POLL_INTERVAL, McpClient, McpServerConfig};
pub use error::{McpError, Result};
pub use framing::{FrameDecoder, encode_frame};
pub use ids::{IdGenerator, SequentialIds};
pub use inbox::Inbox;
pub use protocol::{
    CallToolParams, InitializeParams, InitializeResult, JsonRpcError, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, ServerInfo, ToolInfo, tool_result_is_error,
    tool_result_text,
};
pub use transport::{StderrTail, StdioTransport};
