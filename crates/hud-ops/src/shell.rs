//! Shell command execution.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

/// Default limit on how long a command may run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Exit status and captured output of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    fn failure(reason: String) -> Self {
        Self {
            code: 1,
            stdout: String::new(),
            stderr: reason,
        }
    }

    /// Whether the command exited with status 0.
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Run `command` through `sh -c`.
///
/// Never fails: a command that cannot be started, or that outlives
/// `limit`, comes back with code 1 and the reason in `stderr`.
pub async fn run(command: &str, cwd: Option<&Path>, limit: Duration) -> CommandOutput {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    run_command(cmd, command, cwd, limit).await
}

/// Run a program with explicit arguments, no shell involved.
pub async fn run_args(program: &str, args: &[&str], cwd: Option<&Path>, limit: Duration) -> CommandOutput {
    let mut cmd = Command::new(program);
    cmd.args(args);
    let label = std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ");
    run_command(cmd, &label, cwd, limit).await
}

async fn run_command(mut cmd: Command, label: &str, cwd: Option<&Path>, limit: Duration) -> CommandOutput {
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::debug!(command = %label, "running command");

    match timeout(limit, cmd.output()).await {
        Ok(Ok(output)) => {
            let code = output.status.code().unwrap_or(-1);
            tracing::debug!(command = %label, code, "command finished");
            CommandOutput {
                code,
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }
        }
        Ok(Err(e)) => {
            tracing::warn!(command = %label, error = %e, "failed to execute command");
            CommandOutput::failure(format!("Failed to execute command: {}", e))
        }
        Err(_) => {
            tracing::warn!(command = %label, timeout_secs = limit.as_secs_f64(), "command timed out");
            CommandOutput::failure(format!("Command timed out after {:?}", limit))
        }
    }
}
