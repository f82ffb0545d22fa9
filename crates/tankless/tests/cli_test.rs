//! Integration tests for the `tankless` CLI binary.
//!
//! These tests validate argument parsing, help output, shell completions,
//! config handling and error exit codes without a real heater.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `tankless` binary with env isolation.
///
/// Clears all `TANKLESS_*` env vars and points config directories at
/// `home` so tests never touch the user's real configuration.
fn tankless_cmd(home: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("tankless");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .env_remove("TANKLESS_PROFILE")
        .env_remove("TANKLESS_MODE")
        .env_remove("TANKLESS_HOST")
        .env_remove("TANKLESS_OUTPUT")
        .env_remove("TANKLESS_USERNAME")
        .env_remove("TANKLESS_PASSWORD");
    cmd
}

fn write_config(home: &Path, body: &str) {
    let dir = home.join(".config").join("tankless");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.toml"), body).unwrap();
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let home = tempfile::tempdir().unwrap();
    let output = tankless_cmd(home.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    assert!(combined_output(&output).contains("Usage"));
}

#[test]
fn test_help_lists_commands() {
    let home = tempfile::tempdir().unwrap();
    tankless_cmd(home.path()).arg("--help").assert().success().stdout(
        predicate::str::contains("status")
            .and(predicate::str::contains("set-temp"))
            .and(predicate::str::contains("recirc"))
            .and(predicate::str::contains("login")),
    );
}

#[test]
fn test_version_flag() {
    let home = tempfile::tempdir().unwrap();
    tankless_cmd(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("tankless"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    let home = tempfile::tempdir().unwrap();
    tankless_cmd(home.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    let home = tempfile::tempdir().unwrap();
    tankless_cmd(home.path())
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Argument validation ─────────────────────────────────────────────

#[test]
fn test_set_temp_requires_number() {
    let home = tempfile::tempdir().unwrap();
    tankless_cmd(home.path())
        .args(["set-temp", "hot"])
        .assert()
        .code(2);
}

#[test]
fn test_power_rejects_unknown_state() {
    let home = tempfile::tempdir().unwrap();
    tankless_cmd(home.path())
        .args(["power", "maybe"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("possible values"));
}

#[test]
fn test_watch_rejects_bad_interval() {
    let home = tempfile::tempdir().unwrap();
    tankless_cmd(home.path())
        .args(["watch", "--interval", "soon"])
        .assert()
        .code(2);
}

// ── Configuration ───────────────────────────────────────────────────

#[test]
fn test_config_path_uses_platform_dir() {
    let home = tempfile::tempdir().unwrap();
    tankless_cmd(home.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("config.toml").and(predicate::str::contains("tokens.toml")),
        );
}

#[test]
fn test_config_show_redacts_password() {
    let home = tempfile::tempdir().unwrap();
    write_config(
        home.path(),
        r#"
[profiles.default]
mode = "cloud"
api_url = "https://cloud.example/api"
username = "owner@example.com"
password = "hunter2"
"#,
    );
    tankless_cmd(home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("owner@example.com")
                .and(predicate::str::contains("hunter2").not()),
        );
}

#[test]
fn test_missing_profile_is_usage_error() {
    let home = tempfile::tempdir().unwrap();
    let output = tankless_cmd(home.path()).arg("status").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(text.contains("Profile 'default' not found"), "got:\n{text}");
}

#[test]
fn test_invalid_mode_in_profile_is_usage_error() {
    let home = tempfile::tempdir().unwrap();
    write_config(
        home.path(),
        r#"
[profiles.default]
mode = "bluetooth"
"#,
    );
    let output = tankless_cmd(home.path()).arg("devices").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("mode"));
}

#[test]
fn test_login_needs_cloud_account() {
    let home = tempfile::tempdir().unwrap();
    write_config(
        home.path(),
        r#"
[profiles.default]
mode = "local"
host = "10.0.0.7"
"#,
    );
    tankless_cmd(home.path()).arg("login").assert().code(2);
}

// ── Connection errors ───────────────────────────────────────────────

#[test]
fn test_unreachable_heater_is_connection_error() {
    let home = tempfile::tempdir().unwrap();
    // Bind then drop to get a port nobody listens on.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let output = tankless_cmd(home.path())
        .args(["--host", &format!("127.0.0.1:{port}"), "status"])
        .output()
        .unwrap();
    assert_eq!(
        output.status.code(),
        Some(7),
        "output:\n{}",
        combined_output(&output)
    );
}
