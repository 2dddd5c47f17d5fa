//! CLI integration tests for the hud command-line interface.
//!
//! Every test points `HUD_HOME` at a temporary directory and clears the
//! provider and MCP environment, so nothing touches the real home or network
//! except the local mock server.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Get a command for the hud binary with an isolated home.
fn hud(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("hud").unwrap();
    cmd.env("HUD_HOME", home.path());
    for var in [
        "GPT_HUD_HOME",
        "HUD_PROVIDER",
        "HUD_MODEL",
        "MCP_CMD",
        "OPENAI_API_KEY",
        "OPENAI_BASE_URL",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_subcommands() {
    let home = TempDir::new().unwrap();
    hud(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ask"))
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("mcp"))
        .stdout(predicate::str::contains("config"))
        .stdout(predicate::str::contains("--mcp-cmd"));
}

#[test]
fn test_version_displays() {
    let home = TempDir::new().unwrap();
    hud(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("hud"));
}

#[test]
fn test_unknown_flag_is_usage_error() {
    let home = TempDir::new().unwrap();
    hud(&home).arg("--no-such-flag").assert().code(2);
}

// ─────────────────────────────────────────────────────────────────────────────
// Ask Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_ask_without_prompt_is_usage_error() {
    let home = TempDir::new().unwrap();
    hud(&home)
        .arg("ask")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--prompt"));
}

#[test]
fn test_ask_without_credentials_is_config_error() {
    let home = TempDir::new().unwrap();
    hud(&home)
        .args(["ask", "--prompt", "hello"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("OPENAI_API_KEY"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ask_against_openai_compatible_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "pong"}}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let base_url = server.uri();
    tokio::task::spawn_blocking(move || {
        let home = TempDir::new().unwrap();
        hud(&home)
            .env("OPENAI_API_KEY", "test-key")
            .env("OPENAI_BASE_URL", base_url)
            .args(["ask", "--prompt", "ping", "--system", "terse"])
            .assert()
            .success()
            .stdout(predicate::str::contains("pong"));
    })
    .await
    .unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Config Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_config_path() {
    let home = TempDir::new().unwrap();
    hud(&home)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.yaml"));
}

#[test]
fn test_config_show_defaults() {
    let home = TempDir::new().unwrap();
    hud(&home)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("active_profile: default"))
        .stdout(predicate::str::contains("gpt-4o-mini"));
}

#[test]
fn test_config_use_persists() {
    let home = TempDir::new().unwrap();
    hud(&home)
        .args(["config", "use", "work"])
        .assert()
        .success()
        .stdout(predicate::str::contains("work"));

    hud(&home)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("active_profile: work"));
    assert!(home.path().join("config.yaml").exists());
}

#[test]
fn test_config_roots_add_and_list() {
    let home = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    let project_path = project.path().canonicalize().unwrap();

    hud(&home)
        .args(["config", "roots"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(no roots)"));

    hud(&home)
        .args(["config", "roots", "add"])
        .arg(project.path())
        .assert()
        .success();

    hud(&home)
        .args(["config", "roots"])
        .assert()
        .success()
        .stdout(predicate::str::contains(project_path.display().to_string()));
}

#[test]
fn test_malformed_config_is_config_error() {
    let home = TempDir::new().unwrap();
    std::fs::write(home.path().join("config.yaml"), "profiles: [unclosed").unwrap();
    hud(&home).args(["config", "show"]).assert().code(2);
}

// ─────────────────────────────────────────────────────────────────────────────
// MCP Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_mcp_without_command_is_usage_error() {
    let home = TempDir::new().unwrap();
    hud(&home)
        .args(["mcp", "tools"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("MCP_CMD"));
}

#[test]
fn test_mcp_spawn_failure_is_runtime_error() {
    let home = TempDir::new().unwrap();
    hud(&home)
        .args(["--mcp-cmd", "hud-no-such-mcp-server", "mcp", "tools"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("failed to spawn"));
}

#[test]
fn test_mcp_call_bad_json_is_usage_error() {
    let home = TempDir::new().unwrap();
    hud(&home)
        .args(["--mcp-cmd", "hud-no-such-mcp-server", "mcp", "call", "echo", "{oops"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid JSON"));
}

// ─────────────────────────────────────────────────────────────────────────────
// REPL Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_repl_runs_commands_from_stdin() {
    let home = TempDir::new().unwrap();
    hud(&home)
        .arg("chat")
        .write_stdin("/attachments\n/system be brief\n/quit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("(no attachments)"))
        .stdout(predicate::str::contains("system prompt set."));
}

#[test]
fn test_repl_chat_without_provider_warns() {
    let home = TempDir::new().unwrap();
    hud(&home)
        .write_stdin("hello there\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Provider not configured"));
}
