//! CLI end-to-end tests
//!
//! Tests for the clipforge command-line interface.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the clipforge binary
#[allow(deprecated)]
fn clipforge_cmd() -> Command {
    Command::cargo_bin("clipforge").unwrap()
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = clipforge_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_command() {
    let mut cmd = clipforge_cmd();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("clipforge"));
}

#[test]
fn test_cli_classify_video() {
    let mut cmd = clipforge_cmd();
    cmd.args(["classify", "clip.MP4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Kind: video"))
        .stdout(predicate::str::contains("MIME: video/mp4"))
        .stdout(predicate::str::contains("Default output: mp4"));
}

#[test]
fn test_cli_classify_json() {
    let mut cmd = clipforge_cmd();
    let output = cmd.args(["classify", "song.flac", "--json"]).output().unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["kind"], "audio");
    assert_eq!(json["default_output"], "mp3");
}

#[test]
fn test_cli_classify_unknown_extension_fails() {
    let mut cmd = clipforge_cmd();
    cmd.args(["classify", "notes.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported file format"));
}

#[test]
fn test_cli_plan_with_fallback() {
    let mut cmd = clipforge_cmd();
    let output = cmd
        .args([
            "plan",
            "clip.mp4",
            "--format",
            "mp3",
            "--quality",
            "high",
            "--size",
            "1000000",
            "--supports",
            "audio/webm",
            "--json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["variant"], "video-to-audio");
    assert_eq!(json["preferred_mime_type"], "audio/mpeg");
    assert_eq!(json["negotiated_mime_type"], "audio/webm");
    assert_eq!(json["audio_bits_per_second"], 320000);
    assert_eq!(json["load_timeout_ms"], 100000);
    assert_eq!(json["output_file_name"], "clip.mp3");
}

#[test]
fn test_cli_plan_audio_to_video_fails() {
    let mut cmd = clipforge_cmd();
    cmd.args(["plan", "song.mp3", "--format", "mp4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported conversion"));
}

#[test]
fn test_cli_plan_no_encoder() {
    let mut cmd = clipforge_cmd();
    cmd.args(["plan", "clip.mp4", "--format", "webm", "--supports", "audio/wav"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No supported video encoder"));
}

#[test]
fn test_cli_simulate_short_clip() {
    let mut cmd = clipforge_cmd();
    let output = cmd
        .args([
            "simulate",
            "clip.mp4",
            "--format",
            "mp3",
            "--quality",
            "high",
            "--duration",
            "0.5",
            "--size",
            "1024",
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["fileName"], "clip.mp3");
    assert_eq!(json["mimeType"], "audio/mpeg");
    assert!(json["size"].as_u64().unwrap() > 0);
}

#[test]
fn test_cli_simulate_without_audio_fails() {
    let mut cmd = clipforge_cmd();
    cmd.args([
        "simulate",
        "clip.mp4",
        "--format",
        "mp3",
        "--duration",
        "0.5",
        "--no-audio",
    ])
    .assert()
    .failure()
    .stdout(predicate::str::contains("NoAudioTrack"));
}

#[test]
fn test_cli_validate_valid_config() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("clipforge.toml");
    fs::write(
        &config_path,
        r#"
[pipeline]
load_timeout_min_ms = 30000
progress_interval_ms = 250

[coordinator]
history_size = 5
"#,
    )
    .unwrap();

    let mut cmd = clipforge_cmd();
    cmd.arg("validate")
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("30000-300000 ms"))
        .stdout(predicate::str::contains("History size: 5"));
}

#[test]
fn test_cli_validate_invalid_config() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("bad.toml");
    fs::write(
        &config_path,
        "[pipeline]\nload_timeout_min_ms = 500000\nload_timeout_max_ms = 1000\n",
    )
    .unwrap();

    let mut cmd = clipforge_cmd();
    cmd.arg("validate")
        .arg(&config_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("load_timeout_min_ms"));
}

#[test]
fn test_cli_validate_nonexistent_config() {
    let mut cmd = clipforge_cmd();
    cmd.arg("validate")
        .arg("/nonexistent/clipforge.toml")
        .assert()
        .failure();
}
