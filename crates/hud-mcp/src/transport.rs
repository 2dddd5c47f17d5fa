//! Stdio transport: owns the server child process and its three pipes.
//!
//! Two background threads run for the lifetime of the child:
//! - the stdout reader feeds a [`FrameDecoder`] and routes every decoded
//!   message to the shared [`Inbox`];
//! - the stderr reader keeps a bounded tail of recent lines for diagnostics.
//!
//! Neither thread is joined on close. They exit on their own when the pipes
//! reach end-of-stream.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{McpError, Result};
use crate::framing::FrameDecoder;
use crate::inbox::Inbox;

/// How long `close()` waits for a graceful exit before killing.
pub const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Lines of stderr kept in the diagnostic ring.
pub const STDERR_CAPACITY: usize = 64;

/// Lines of stderr quoted in a transport failure.
const STDERR_SUMMARY_LINES: usize = 5;

/// How long a failure report waits for the stderr reader to catch up.
const STDERR_SETTLE: Duration = Duration::from_millis(200);

/// Read size for the stdout loop.
const READ_CHUNK: usize = 8 * 1024;

// ─────────────────────────────────────────────────────────────────────────────
// Stderr tail
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct TailState {
    lines: VecDeque<String>,
    eof: bool,
}

/// Bounded ring of the most recent stderr lines.
#[derive(Debug)]
pub struct StderrTail {
    state: Mutex<TailState>,
    finished: Condvar,
    capacity: usize,
}

impl Default for StderrTail {
    fn default() -> Self {
        Self::new(STDERR_CAPACITY)
    }
}

impl StderrTail {
    /// Keep at most `capacity` lines.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(TailState::default()),
            finished: Condvar::new(),
            capacity,
        }
    }

    /// Record one line, evicting the oldest when full.
    pub fn push(&self, line: impl Into<String>) {
        let mut state = self.state.lock();
        state.lines.push_back(line.into());
        while state.lines.len() > self.capacity {
            state.lines.pop_front();
        }
    }

    /// Mark the stream as finished.
    pub fn finish(&self) {
        self.state.lock().eof = true;
        self.finished.notify_all();
    }

    /// Wait up to `timeout` for the stream to finish. Returns whether it did.
    pub fn wait_finished(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.eof {
            if self.finished.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.eof
    }

    /// All retained lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.state.lock().lines.iter().cloned().collect()
    }

    /// The last `n` lines joined with `" | "`, or `"no stderr"`.
    pub fn summary(&self, n: usize) -> String {
        let state = self.state.lock();
        if state.lines.is_empty() {
            return "no stderr".to_string();
        }
        let skip = state.lines.len().saturating_sub(n);
        state
            .lines
            .iter()
            .skip(skip)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

/// A running MCP server process reached over its standard streams.
pub struct StdioTransport {
    name: String,
    pid: u32,
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    inbox: Arc<Inbox>,
    stderr: Arc<StderrTail>,
}

impl StdioTransport {
    /// Spawn `command` and start both reader threads.
    ///
    /// Returns as soon as the process exists; it does not wait for the
    /// server to become ready. If anything after the spawn fails, the child
    /// is torn down before the error is returned.
    pub fn spawn(
        name: &str,
        command: &str,
        args: &[String],
        env: &[(String, String)],
        cwd: Option<&Path>,
        inbox: Arc<Inbox>,
    ) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        for (key, value) in env {
            cmd.env(key, value);
        }
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| McpError::spawn_failed(format!("failed to spawn '{}': {}", command, e)))?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let transport = Self {
            name: name.to_string(),
            pid: child.id(),
            child: Mutex::new(Some(child)),
            stdin: Mutex::new(stdin),
            inbox,
            stderr: Arc::new(StderrTail::default()),
        };

        let (Some(stdout), Some(stderr)) = (stdout, stderr) else {
            return Err(McpError::spawn_failed(format!(
                "'{}' started without piped stdout/stderr",
                command
            )));
        };

        transport.start_readers(stdout, stderr)?;

        tracing::info!(
            server = %transport.name,
            command = %command,
            pid = transport.pid,
            "spawned MCP server"
        );

        Ok(transport)
    }

    fn start_readers(&self, stdout: ChildStdout, stderr: ChildStderr) -> Result<()> {
        let inbox = Arc::clone(&self.inbox);
        let server = self.name.clone();
        thread::Builder::new()
            .name(format!("mcp-stdout-{}", self.name))
            .spawn(move || read_stdout(stdout, inbox, server))?;

        let tail = Arc::clone(&self.stderr);
        let server = self.name.clone();
        thread::Builder::new()
            .name(format!("mcp-stderr-{}", self.name))
            .spawn(move || read_stderr(stderr, tail, server))?;

        Ok(())
    }

    /// Server name used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Process id of the child.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Correlation state fed by the stdout reader.
    pub fn inbox(&self) -> &Arc<Inbox> {
        &self.inbox
    }

    /// Diagnostic stderr ring.
    pub fn stderr(&self) -> &Arc<StderrTail> {
        &self.stderr
    }

    /// Write one complete frame to the child's stdin and flush it.
    ///
    /// The stdin lock is held for the whole write, so concurrent callers
    /// never interleave partial frames. The write itself has no deadline: a
    /// child that stops draining stdin blocks this call past any request timeout.
    pub fn write_frame(&self, frame: &[u8]) -> Result<()> {
        let mut guard = self.stdin.lock();
        let stdin = guard.as_mut().ok_or(McpError::NotStarted)?;

        let written = stdin.write_all(frame).and_then(|()| stdin.flush());
        match written {
            Ok(()) => {
                tracing::trace!(server = %self.name, bytes = frame.len(), "sent MCP frame");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                drop(guard);
                Err(self.died())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Whether the child is still running.
    pub fn is_alive(&self) -> bool {
        let mut guard = self.child.lock();
        let Some(child) = guard.as_mut() else {
            return false;
        };

        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                tracing::debug!(server = %self.name, status = %status, "MCP server exited");
                false
            }
            Err(e) => {
                tracing::warn!(server = %self.name, error = %e, "failed to poll MCP server");
                false
            }
        }
    }

    /// Build a transport-died error quoting recent stderr.
    pub fn died(&self) -> McpError {
        self.stderr.wait_finished(STDERR_SETTLE);
        McpError::transport_died(self.stderr.summary(STDERR_SUMMARY_LINES))
    }

    /// Terminate the child: polite signal, grace period, then kill.
    ///
    /// Safe to call any number of times. Internal failures are logged and
    /// swallowed.
    pub fn close(&self) {
        let Some(mut child) = self.child.lock().take() else {
            return;
        };
        // Closing stdin lets well-behaved servers exit on their own.
        self.stdin.lock().take();

        if let Ok(Some(_)) = child.try_wait() {
            return;
        }

        terminate(&mut child);

        let deadline = Instant::now() + CLOSE_GRACE;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    tracing::debug!(server = %self.name, status = %status, "MCP server stopped");
                    return;
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(20)),
                _ => break,
            }
        }

        tracing::warn!(server = %self.name, pid = self.pid, "MCP server ignored terminate, killing");
        if let Err(e) = child.kill() {
            tracing::debug!(server = %self.name, error = %e, "kill failed");
        }
        let _ = child.wait();
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    let Ok(pid) = libc::pid_t::try_from(child.id()) else {
        let _ = child.kill();
        return;
    };
    // SAFETY: `pid` is our own unreaped child, so it cannot have been recycled.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc != 0 {
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.kill();
}

// ─────────────────────────────────────────────────────────────────────────────
// Reader loops
// ─────────────────────────────────────────────────────────────────────────────

fn read_stdout(mut stdout: ChildStdout, inbox: Arc<Inbox>, server: String) {
    let mut decoder = FrameDecoder::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        match stdout.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                decoder.push(&chunk[..n]);
                while let Some(frame) = decoder.next_frame() {
                    match frame {
                        Ok(message) => inbox.deliver(message),
                        Err(e) => {
                            tracing::debug!(server = %server, error = %e, "dropping malformed MCP frame");
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::debug!(server = %server, error = %e, "MCP stdout read failed");
                break;
            }
        }
    }

    tracing::debug!(server = %server, leftover = decoder.buffered(), "MCP stdout closed");
    inbox.close();
}

fn read_stderr(stderr: ChildStderr, tail: Arc<StderrTail>, server: String) {
    let mut reader = BufReader::new(stderr);
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line).trim_end().to_string();
                tracing::debug!(server = %server, line = %text, "MCP stderr");
                tail.push(text);
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }

    tail.finish();
}
