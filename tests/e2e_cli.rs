//! CLI end-to-end tests
//!
//! Tests for the audioforge command-line interface.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the audioforge binary
#[allow(deprecated)]
fn audioforge_cmd() -> Command {
    Command::cargo_bin("audioforge").unwrap()
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = audioforge_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_command() {
    let mut cmd = audioforge_cmd();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("audioforge"));
}

#[test]
fn test_cli_convert_help() {
    let mut cmd = audioforge_cmd();
    cmd.args(["convert", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--format"));
}

#[test]
fn test_cli_check_tools_lists_tools() {
    let mut cmd = audioforge_cmd();
    cmd.arg("check-tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("ffmpeg"))
        .stdout(predicate::str::contains("yt-dlp"));
}

#[test]
fn test_cli_validate_config_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("audioforge.json");
    fs::write(
        &path,
        r#"{
            "server": { "port": 9100 },
            "conversion": { "max_concurrent_jobs": 3 },
            "remote": { "allowed_hosts": ["video.example"] }
        }"#,
    )
    .unwrap();

    let mut cmd = audioforge_cmd();
    cmd.arg("validate")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains(":9100"))
        .stdout(predicate::str::contains("Workers: 3"))
        .stdout(predicate::str::contains("video.example"));
}

#[test]
fn test_cli_validate_rejects_malformed_config() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ not json").unwrap();

    let mut cmd = audioforge_cmd();
    cmd.arg("validate").arg(&path).assert().failure();
}

#[test]
fn test_cli_convert_missing_input_fails() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("audioforge.json");
    let storage = dir.path().to_string_lossy().replace('\\', "/");
    fs::write(
        &config,
        format!(
            r#"{{ "storage": {{ "staging_dir": "{storage}/uploads", "output_dir": "{storage}/output" }} }}"#
        ),
    )
    .unwrap();

    let mut cmd = audioforge_cmd();
    cmd.arg("--config")
        .arg(&config)
        .args(["convert", "does-not-exist.mov"])
        .assert()
        .failure();
}
