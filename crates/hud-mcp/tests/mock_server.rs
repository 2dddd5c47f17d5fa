//! Mock MCP server for integration testing.
//!
//! Speaks framed JSON-RPC on stdin/stdout and serves two tools, `echo` and
//! `add`.
//!
//! Usage:
//!   mock-mcp-server [--delay-ms N] [--legacy-list] [--legacy-call]
//!                   [--stray-id] [--notify] [--silent] [--die-with-stderr MSG]
//!
//! Options:
//!   --delay-ms N             Add N ms delay to all responses
//!   --legacy-list            Only answer `tools.list`; `tools/list` is unknown
//!   --legacy-call            Only answer `tools/execute`; `tools/call` is unknown
//!   --stray-id               Send a response for an unrelated id first
//!   --notify                 Send a progress notification before each response
//!   --silent                 Read requests but never answer
//!   --die-with-stderr MSG    Print MSG to stderr and exit 3 on the first request

use std::env;
use std::io::{BufRead, BufReader, Read, Write};
use std::thread;
use std::time::Duration;

use serde_json::{Value, json};

#[derive(Default)]
struct Behaviour {
    delay_ms: u64,
    legacy_list: bool,
    legacy_call: bool,
    stray_id: bool,
    notify: bool,
    silent: bool,
    die_with_stderr: Option<String>,
}

impl Behaviour {
    fn from_args() -> Self {
        let mut behaviour = Self::default();
        let mut args = env::args().skip(1);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--delay-ms" => {
                    behaviour.delay_ms = args.next().and_then(|v| v.parse().ok()).unwrap_or(0);
                }
                "--legacy-list" => behaviour.legacy_list = true,
                "--legacy-call" => behaviour.legacy_call = true,
                "--stray-id" => behaviour.stray_id = true,
                "--notify" => behaviour.notify = true,
                "--silent" => behaviour.silent = true,
                "--die-with-stderr" => behaviour.die_with_stderr = args.next(),
                _ => {}
            }
        }

        behaviour
    }
}

fn read_frame(reader: &mut impl BufRead) -> Option<Vec<u8>> {
    let mut content_length = None;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).ok()? == 0 {
            return None;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if content_length.is_some() {
                break;
            }
            continue;
        }
        if let Some((key, value)) = trimmed.split_once(':') {
            if key.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse::<usize>().ok();
            }
        }
    }

    let mut body = vec![0u8; content_length?];
    reader.read_exact(&mut body).ok()?;
    Some(body)
}

fn write_frame(out: &mut impl Write, message: &Value) {
    let body = message.to_string();
    let _ = write!(out, "Content-Length: {}\r\n\r\n{}", body.len(), body);
    let _ = out.flush();
}

fn main() {
    let behaviour = Behaviour::from_args();
    let mut reader = BufReader::new(std::io::stdin().lock());
    let mut stdout = std::io::stdout();

    while let Some(body) = read_frame(&mut reader) {
        let Ok(message) = serde_json::from_slice::<Value>(&body) else {
            continue;
        };

        // Notifications carry no id and get no answer.
        let Some(id) = message.get("id").and_then(Value::as_u64) else {
            continue;
        };

        if let Some(msg) = &behaviour.die_with_stderr {
            eprintln!("{msg}");
            std::process::exit(3);
        }
        if behaviour.silent {
            continue;
        }
        if behaviour.delay_ms > 0 {
            thread::sleep(Duration::from_millis(behaviour.delay_ms));
        }

        if behaviour.notify {
            write_frame(
                &mut stdout,
                &json!({"jsonrpc": "2.0", "method": "notifications/progress", "params": {"id": id}}),
            );
        }
        if behaviour.stray_id {
            write_frame(
                &mut stdout,
                &json!({"jsonrpc": "2.0", "id": id + 1_000_000, "result": {"stray": true}}),
            );
        }

        let method = message.get("method").and_then(Value::as_str).unwrap_or("");
        let params = message.get("params").cloned().unwrap_or(Value::Null);
        let response = match handle(method, &params, &behaviour) {
            Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
            Err(error) => json!({"jsonrpc": "2.0", "id": id, "error": error}),
        };
        write_frame(&mut stdout, &response);
    }
}

fn method_not_found(method: &str) -> Value {
    json!({"code": -32601, "message": format!("Method not found: {method}")})
}

fn handle(method: &str, params: &Value, behaviour: &Behaviour) -> Result<Value, Value> {
    match method {
        "initialize" => Ok(json!({
            "protocolVersion": "2024-11-05",
            "capabilities": { "tools": {} },
            "serverInfo": { "name": "mock-mcp-server", "version": "1.0.0" }
        })),
        "tools/list" if !behaviour.legacy_list => Ok(tool_list()),
        "tools.list" if behaviour.legacy_list => Ok(tool_list()),
        "tools/call" if !behaviour.legacy_call => call_tool(params),
        "tools/execute" if behaviour.legacy_call => call_tool(params),
        other => Err(method_not_found(other)),
    }
}

fn tool_list() -> Value {
    json!({
        "tools": [
            {
                "name": "echo",
                "description": "Echo back the input",
                "inputSchema": {
                    "type": "object",
                    "properties": { "message": { "type": "string" } },
                    "required": ["message"]
                }
            },
            {
                "name": "add",
                "description": "Add two numbers",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "a": { "type": "number" },
                        "b": { "type": "number" }
                    },
                    "required": ["a", "b"]
                }
            }
        ]
    })
}

fn call_tool(params: &Value) -> Result<Value, Value> {
    let name = params.get("name").and_then(Value::as_str).unwrap_or("");
    let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

    match name {
        "echo" => {
            let message = args.get("message").and_then(Value::as_str).unwrap_or("");
            Ok(json!({ "content": [{ "type": "text", "text": message }] }))
        }
        "add" => {
            let a = args.get("a").and_then(Value::as_f64).unwrap_or(0.0);
            let b = args.get("b").and_then(Value::as_f64).unwrap_or(0.0);
            Ok(json!({ "content": [{ "type": "text", "text": format!("{}", a + b) }] }))
        }
        other => Err(json!({"code": -32602, "message": format!("Unknown tool: {other}")})),
    }
}
