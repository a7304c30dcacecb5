//! CLI end-to-end tests
//!
//! Tests for the setbox command-line interface.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the setbox binary
#[allow(deprecated)]
fn setbox_cmd() -> Command {
    Command::cargo_bin("setbox").unwrap()
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = setbox_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = setbox_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("setbox"))
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_flag() {
    let mut cmd = setbox_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("setbox"));
}

#[test]
fn test_cli_version_command() {
    let mut cmd = setbox_cmd();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_check_tools_command() {
    let mut cmd = setbox_cmd();
    cmd.arg("check-tools")
        .assert()
        .stdout(predicate::str::contains("ffmpeg").or(predicate::str::contains("ffprobe")));
}

#[test]
fn test_cli_decide_help() {
    let mut cmd = setbox_cmd();
    cmd.args(["decide", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--device"))
        .stdout(predicate::str::contains("--mime"));
}

#[test]
fn test_cli_stream_help() {
    let mut cmd = setbox_cmd();
    cmd.args(["stream", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--offset"));
}

#[test]
fn test_cli_probe_nonexistent_file() {
    let mut cmd = setbox_cmd();
    cmd.args(["probe", "/nonexistent/path/movie.mkv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_cli_validate_config() {
    let temp = tempdir().unwrap();
    let config_file = temp.path().join("setbox.toml");

    fs::write(
        &config_file,
        r#"
[streaming]
block_size = 65536
max_blocks = 4

[[devices]]
identity = "7460001"
video_br = "12M"
"#,
    )
    .unwrap();

    let mut cmd = setbox_cmd();
    cmd.args(["validate", config_file.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid"))
        .stdout(predicate::str::contains("65536 byte blocks, 4 retained"))
        .stdout(predicate::str::contains("Devices: 1"));
}

#[test]
fn test_cli_validate_reports_warnings() {
    let temp = tempdir().unwrap();
    let config_file = temp.path().join("setbox.toml");

    fs::write(
        &config_file,
        r#"
[streaming]
max_blocks = 0

[[devices]]
identity = "5400001"

[[devices]]
identity = "5400001"
"#,
    )
    .unwrap();

    let mut cmd = setbox_cmd();
    cmd.args(["validate", config_file.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("warning: streaming.max_blocks is 0"))
        .stdout(predicate::str::contains("listed more than once"));
}

#[test]
fn test_cli_validate_rejects_broken_config() {
    let temp = tempdir().unwrap();
    let config_file = temp.path().join("setbox.toml");
    fs::write(&config_file, "[streaming\nblock_size = ").unwrap();

    let mut cmd = setbox_cmd();
    cmd.args(["validate", config_file.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config file"));
}
