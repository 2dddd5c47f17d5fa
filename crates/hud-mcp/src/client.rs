//! MCP client: request/response correlation over a [`StdioTransport`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde_json::{Value, json};

use crate::error::{McpError, Result};
use crate::framing::encode_frame;
use crate::ids::{IdGenerator, SequentialIds};
use crate::inbox::Inbox;
use crate::protocol::{
    CallToolParams, InitializeParams, InitializeResult, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, ServerInfo, ToolInfo, methods,
};
use crate::transport::StdioTransport;

/// Default timeout for `list_tools`, `call_tool` and `initialize`.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Upper bound on how long a waiting caller goes without re-checking that
/// the server is still alive.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Grace given to the stdout reader to hand over a response that was
/// written just before the server exited.
const EXIT_DRAIN: Duration = Duration::from_millis(50);

/// Configuration for an MCP server process.
#[derive(Debug, Clone)]
pub struct McpServerConfig {
    /// Name used in logs and messages.
    pub name: String,
    /// Program to spawn.
    pub command: String,
    /// Arguments to pass to the command.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Working directory (defaults to the current one).
    pub cwd: Option<PathBuf>,
    /// Timeout for the convenience operations.
    pub request_timeout: Duration,
}

impl McpServerConfig {
    /// Create a config for `command` with no arguments.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Parse a whitespace-separated command line such as `node server.mjs`.
    ///
    /// Returns `None` for a blank line.
    pub fn from_command_line(name: impl Into<String>, line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let command = parts.next()?;
        Some(Self::new(name, command).with_args(parts.collect()))
    }

    /// Replace the arguments.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Add an argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add an environment variable.
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the working directory.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Set the timeout used by the convenience operations.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// A client for one MCP server process.
///
/// Construction does not spawn anything; call [`McpClient::start`].
/// All methods take `&self`, and concurrent callers each receive their own
/// response: every request registers its id with the inbox before it is
/// written, and the reader thread completes that slot directly.
pub struct McpClient {
    config: McpServerConfig,
    ids: Arc<dyn IdGenerator>,
    transport: RwLock<Option<Arc<StdioTransport>>>,
    server_info: Mutex<Option<ServerInfo>>,
}

impl McpClient {
    /// Create an unstarted client.
    pub fn new(config: McpServerConfig) -> Self {
        Self {
            config,
            ids: Arc::new(SequentialIds::new()),
            transport: RwLock::new(None),
            server_info: Mutex::new(None),
        }
    }

    /// Use a custom id source.
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Server name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &McpServerConfig {
        &self.config
    }

    /// Server info, once `initialize` has succeeded.
    pub fn server_info(&self) -> Option<ServerInfo> {
        self.server_info.lock().clone()
    }

    /// Spawn the server process.
    ///
    /// Does nothing if a live process is already attached. A dead one is
    /// replaced.
    pub fn start(&self) -> Result<()> {
        let mut slot = self.transport.write();
        if let Some(existing) = slot.as_ref() {
            if existing.is_alive() {
                return Ok(());
            }
            existing.close();
        }

        let transport = StdioTransport::spawn(
            &self.config.name,
            &self.config.command,
            &self.config.args,
            &self.config.env,
            self.config.cwd.as_deref(),
            Arc::new(Inbox::default()),
        )?;

        *slot = Some(Arc::new(transport));
        *self.server_info.lock() = None;
        Ok(())
    }

    /// Stop the server process. Idempotent, never fails.
    pub fn close(&self) {
        let transport = self.transport.write().take();
        if let Some(transport) = transport {
            tracing::info!(server = %self.config.name, "shutting down MCP server");
            transport.close();
        }
    }

    /// Whether a live server process is attached.
    pub fn is_running(&self) -> bool {
        self.transport
            .read()
            .as_ref()
            .is_some_and(|transport| transport.is_alive())
    }

    /// Recent stderr lines from the server, oldest first.
    pub fn stderr_tail(&self) -> Vec<String> {
        self.transport
            .read()
            .as_ref()
            .map(|transport| transport.stderr().lines())
            .unwrap_or_default()
    }

    fn transport(&self) -> Result<Arc<StdioTransport>> {
        self.transport.read().clone().ok_or(McpError::NotStarted)
    }

    /// Send `method` and block until its response, a server error, the
    /// timeout, or the death of the server process.
    ///
    /// The timeout is measured from just before the request is written.
    pub fn request(&self, method: &str, params: Option<Value>, timeout: Duration) -> Result<Value> {
        let transport = self.transport()?;
        if !transport.is_alive() {
            return Err(transport.died());
        }

        let id = self.ids.next_id();
        let frame = encode_frame(&JsonRpcRequest::new(id, method, params))?;
        let inbox = transport.inbox();

        inbox.register(id);
        let started = Instant::now();
        if let Err(e) = transport.write_frame(&frame) {
            inbox.cancel(id);
            return Err(e);
        }
        tracing::debug!(server = %self.config.name, id, method, "sent MCP request");

        loop {
            let remaining = timeout.saturating_sub(started.elapsed());
            if let Some(message) = inbox.wait(id, remaining.min(POLL_INTERVAL)) {
                return self.finish_request(id, method, message);
            }

            if !transport.is_alive() {
                if let Some(message) = inbox.wait(id, EXIT_DRAIN) {
                    return self.finish_request(id, method, message);
                }
                inbox.cancel(id);
                tracing::warn!(server = %self.config.name, id, method, "MCP server died mid-request");
                return Err(transport.died());
            }

            if started.elapsed() >= timeout {
                inbox.cancel(id);
                tracing::warn!(server = %self.config.name, id, method, "MCP request timed out");
                return Err(McpError::Timeout {
                    method: method.to_string(),
                    elapsed: started.elapsed(),
                });
            }
        }
    }

    fn finish_request(&self, id: u64, method: &str, message: Value) -> Result<Value> {
        let response: JsonRpcResponse = serde_json::from_value(message)
            .map_err(|e| McpError::protocol(format!("malformed response to {method}: {e}")))?;
        match response.into_result() {
            Ok(result) => {
                tracing::debug!(server = %self.config.name, id, method, "MCP request completed");
                Ok(result)
            }
            Err(e) => {
                tracing::debug!(
                    server = %self.config.name,
                    id,
                    method,
                    code = e.code,
                    message = %e.message,
                    "MCP server returned error"
                );
                Err(McpError::server_error(e.code, e.message, e.data))
            }
        }
    }

    /// Send a notification (no id, no response).
    pub fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let transport = self.transport()?;
        let frame = encode_frame(&JsonRpcNotification::new(method, params))?;
        transport.write_frame(&frame)
    }

    /// Perform the MCP handshake.
    ///
    /// Optional: `list_tools` and `call_tool` work against servers that do
    /// not implement `initialize`.
    pub fn initialize(&self) -> Result<InitializeResult> {
        let params = serde_json::to_value(InitializeParams::default())?;
        let result = self.request(
            methods::INITIALIZE,
            Some(params),
            self.config.request_timeout,
        )?;
        let init: InitializeResult = serde_json::from_value(result)
            .map_err(|e| McpError::protocol(format!("malformed initialize result: {e}")))?;

        tracing::info!(
            server = %init.server_info.name,
            version = %init.server_info.version,
            protocol = %init.protocol_version,
            "MCP server initialized"
        );

        self.notify(methods::INITIALIZED, None)?;
        *self.server_info.lock() = Some(init.server_info.clone());
        Ok(init)
    }

    /// List the server's tools, falling back to the legacy `tools.list`.
    pub fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        let tools = self.with_fallback(methods::TOOLS_LIST, methods::TOOLS_LIST_LEGACY, |method| {
            let result = self.request(method, None, self.config.request_timeout)?;
            parse_tool_list(result)
        })?;

        tracing::debug!(
            server = %self.config.name,
            tool_count = tools.len(),
            "listed MCP tools"
        );
        Ok(tools)
    }

    /// Call a tool, falling back to the legacy `tools/execute`.
    ///
    /// Returns the raw `result` object.
    pub fn call_tool(&self, name: &str, arguments: Option<Value>) -> Result<Value> {
        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments: arguments.unwrap_or_else(|| json!({})),
        })?;

        self.with_fallback(methods::TOOLS_CALL, methods::TOOLS_CALL_LEGACY, |method| {
            self.request(method, Some(params.clone()), self.config.request_timeout)
        })
    }

    /// Run `op` with `primary`; on failure run it once more with `legacy`.
    ///
    /// A dead or unstarted transport is returned straight away since the
    /// second attempt could not succeed.
    fn with_fallback<T>(
        &self,
        primary: &str,
        legacy: &str,
        op: impl Fn(&str) -> Result<T>,
    ) -> Result<T> {
        match op(primary) {
            Ok(value) => Ok(value),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::debug!(
                    server = %self.config.name,
                    primary,
                    legacy,
                    error = %e,
                    "retrying with legacy method name"
                );
                op(legacy)
            }
        }
    }
}

/// Pull the descriptors out of a `tools/list` result.
///
/// Entries that are not valid tool descriptors are skipped; only a missing
/// `tools` array is an error.
fn parse_tool_list(mut result: Value) -> Result<Vec<ToolInfo>> {
    let Some(Value::Array(entries)) = result.get_mut("tools").map(Value::take) else {
        return Err(McpError::protocol("tools list result has no tools array"));
    };

    let tools = entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<ToolInfo>(entry) {
            Ok(tool) => Some(tool),
            Err(e) => {
                tracing::debug!(error = %e, "skipping invalid tool descriptor");
                None
            }
        })
        .collect();
    Ok(tools)
}

impl Drop for McpClient {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn sh(script: &str) -> McpServerConfig {
        McpServerConfig::new("sh", "sh").with_args(vec!["-c".to_string(), script.to_string()])
    }

    #[test]
    fn test_server_config_builder() {
        let config = McpServerConfig::new("test", "mcp-server-test")
            .with_arg("--db")
            .with_arg("/path/to/db")
            .with_env_var("DEBUG", "1")
            .with_cwd("/tmp")
            .with_timeout(Duration::from_secs(3));

        assert_eq!(config.name, "test");
        assert_eq!(config.command, "mcp-server-test");
        assert_eq!(config.args, vec!["--db", "/path/to/db"]);
        assert_eq!(config.env, vec![("DEBUG".to_string(), "1".to_string())]);
        assert_eq!(config.cwd, Some(PathBuf::from("/tmp")));
        assert_eq!(config.request_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_from_command_line() {
        let config = McpServerConfig::from_command_line("pw", "  node  mcp-playwright.mjs --headless ")
            .unwrap();
        assert_eq!(config.command, "node");
        assert_eq!(config.args, vec!["mcp-playwright.mjs", "--headless"]);
        assert!(McpServerConfig::from_command_line("pw", "   ").is_none());
    }

    #[test]
    fn test_parse_tool_list_skips_invalid_entries() {
        let tools = parse_tool_list(json!({
            "tools": [
                {"name": "echo", "description": "Echo text", "inputSchema": {"type": "object"}},
                {"description": "no name"},
                "not an object",
                {"name": "add"}
            ]
        }))
        .unwrap();

        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["echo", "add"]);
        assert_eq!(tools[0].description.as_deref(), Some("Echo text"));
    }

    #[test]
    fn test_parse_tool_list_requires_tools_array() {
        let err = parse_tool_list(json!({"items": []})).unwrap_err();
        assert!(matches!(err, McpError::Protocol(_)), "{err}");
        // Protocol errors are not fatal, so the legacy method still gets a try.
        assert!(!err.is_fatal());

        assert!(parse_tool_list(json!({"tools": {}})).is_err());
        assert!(parse_tool_list(json!({"tools": []})).unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_malformed_response_is_protocol_error() {
        // Answers request id 1 with an error field of the wrong type.
        let client = McpClient::new(sh(
            r#"head -c 1 > /dev/null; body='{"jsonrpc":"2.0","id":1,"error":"boom"}'; printf 'Content-Length: %d\r\n\r\n%s' "${#body}" "$body"; cat > /dev/null"#,
        ));
        client.start().unwrap();

        let err = client
            .request("tools/list", None, Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, McpError::Protocol(_)), "{err}");
        assert!(err.to_string().contains("tools/list"), "{err}");
        client.close();
    }

    #[test]
    fn test_close_before_start_and_twice() {
        let client = McpClient::new(McpServerConfig::new("idle", "nonexistent-cmd"));
        client.close();
        client.close();
        assert!(!client.is_running());
    }

    #[test]
    fn test_request_before_start() {
        let client = McpClient::new(McpServerConfig::new("idle", "nonexistent-cmd"));
        let err = client
            .request("tools/list", None, Duration::from_millis(10))
            .unwrap_err();
        assert!(matches!(err, McpError::NotStarted));

        // Not started is fatal, so there is no legacy retry either.
        assert!(matches!(client.list_tools(), Err(McpError::NotStarted)));
    }

    #[test]
    fn test_start_nonexistent_server() {
        let client = McpClient::new(McpServerConfig::new("test", "nonexistent-mcp-server-12345"));
        let err = client.start().unwrap_err();
        assert!(matches!(err, McpError::SpawnFailed(_)));
        assert!(!client.is_running());
        client.close();
    }

    #[test]
    fn test_injected_id_generator() {
        struct Fixed(AtomicU64);
        impl IdGenerator for Fixed {
            fn next_id(&self) -> u64 {
                self.0.fetch_add(10, Ordering::SeqCst)
            }
        }

        let ids = Arc::new(Fixed(AtomicU64::new(10)));
        let client = McpClient::new(McpServerConfig::new("test", "cat"))
            .with_id_generator(ids.clone());
        let _ = client.request("ping", None, Duration::from_millis(1));
        // Unstarted clients fail before allocating an id.
        assert_eq!(ids.next_id(), 10);
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_fires_on_silent_server() {
        let client = McpClient::new(sh("cat > /dev/null"));
        client.start().unwrap();

        let started = Instant::now();
        let err = client
            .request("tools/list", None, Duration::from_millis(200))
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(err.is_timeout(), "{err}");
        assert!(elapsed >= Duration::from_millis(200), "{elapsed:?}");
        assert!(
            elapsed < Duration::from_millis(200) + POLL_INTERVAL + Duration::from_millis(250),
            "{elapsed:?}"
        );
        assert!(client.is_running());
        client.close();
    }

    #[cfg(unix)]
    #[test]
    fn test_dead_process_detected_before_timeout() {
        let client = McpClient::new(sh(
            "read line; echo 'fatal: no tools configured' >&2; exit 3",
        ));
        client.start().unwrap();

        let started = Instant::now();
        let err = client
            .request("tools/list", None, Duration::from_secs(10))
            .unwrap_err();

        assert!(matches!(err, McpError::TransportDied { .. }), "{err}");
        assert!(err.to_string().contains("fatal: no tools configured"), "{err}");
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(!client.is_running());
    }

    #[cfg(unix)]
    #[test]
    fn test_request_after_exit_fails_immediately() {
        let client = McpClient::new(sh("echo 'bye' >&2"));
        client.start().unwrap();
        while client.is_running() {
            std::thread::sleep(Duration::from_millis(10));
        }

        let started = Instant::now();
        let err = client
            .request("tools/list", None, Duration::from_secs(10))
            .unwrap_err();
        assert!(matches!(err, McpError::TransportDied { .. }));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(client.stderr_tail(), vec!["bye".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_restart_after_close() {
        let client = McpClient::new(sh("cat > /dev/null"));
        client.start().unwrap();
        client.start().unwrap();
        assert!(client.is_running());

        client.close();
        assert!(!client.is_running());

        client.start().unwrap();
        assert!(client.is_running());
    }
}
