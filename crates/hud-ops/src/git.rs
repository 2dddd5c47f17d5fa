//! Thin wrappers over the `git` command line.
//!
//! Each wrapper returns git's stdout when it succeeds and its stderr when it
//! does not, ready to show to the user.

use std::path::Path;

use crate::shell::{CommandOutput, DEFAULT_TIMEOUT, run_args};

async fn git(args: &[&str], cwd: Option<&Path>) -> CommandOutput {
    run_args("git", args, cwd, DEFAULT_TIMEOUT).await
}

fn text(output: CommandOutput) -> String {
    if output.success() {
        output.stdout
    } else {
        output.stderr
    }
}

/// Whether `cwd` is inside a git work tree.
pub async fn is_repo(cwd: Option<&Path>) -> bool {
    let out = git(&["rev-parse", "--is-inside-work-tree"], cwd).await;
    out.success() && out.stdout.trim() == "true"
}

/// `git status --short`
pub async fn status(cwd: Option<&Path>) -> String {
    text(git(&["status", "--short"], cwd).await)
}

/// `git diff -- <path>`
pub async fn diff(path: &str, cwd: Option<&Path>) -> String {
    text(git(&["diff", "--", path], cwd).await)
}

/// `git add -A`
pub async fn add_all(cwd: Option<&Path>) -> String {
    text(git(&["add", "-A"], cwd).await)
}

/// `git commit -m <message>`
pub async fn commit(message: &str, cwd: Option<&Path>) -> String {
    text(git(&["commit", "-m", message], cwd).await)
}

/// `git checkout -- <path>`: discard working-tree changes to `path`.
pub async fn revert(path: &str, cwd: Option<&Path>) -> String {
    text(git(&["checkout", "--", path], cwd).await)
}
