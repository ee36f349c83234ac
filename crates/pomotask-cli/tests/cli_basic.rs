//! Basic CLI E2E tests.
//!
//! Each test runs the built binary offline against a throwaway home
//! directory, so the config file and the SQLite cache start empty.

use std::path::Path;
use std::process::Command;

use serde_json::Value;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_pomotask"))
        .arg("--offline")
        .args(args)
        .env("HOME", home)
        .env_remove("POMOTASK_ENV")
        .env_remove("POMOTASK_TOKEN")
        .env_remove("POMOTASK_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_json(home: &Path, args: &[&str]) -> Value {
    let (stdout, stderr, code) = run_cli(home, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    serde_json::from_str(&stdout).expect("Failed to parse JSON output")
}

#[test]
fn test_config_list_has_sections() {
    let home = tempfile::tempdir().unwrap();
    let listed = run_json(home.path(), &["config", "list"]);
    assert!(listed["path"].as_str().unwrap().ends_with("config.toml"));
    assert!(listed["token_source"].is_null());
    assert!(listed["config"]["backend"]["session_url"].is_string());
    assert_eq!(listed["config"]["timer"]["tick_interval_ms"], 1000);
}

#[test]
fn test_config_list_masks_token() {
    let home = tempfile::tempdir().unwrap();
    run_json(home.path(), &["config", "set", "backend.token", "s3cret"]);
    let (stdout, _, code) = run_cli(home.path(), &["config", "list"]);
    assert_eq!(code, 0);
    assert!(!stdout.contains("s3cret"));

    let listed: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(listed["token_source"], "file");
    assert_eq!(listed["config"]["backend"]["token"], "********");
}

#[test]
fn test_config_set_then_get() {
    let home = tempfile::tempdir().unwrap();
    let (_, _, code) = run_cli(home.path(), &["config", "set", "timer.tick_interval_ms", "500"]);
    assert_eq!(code, 0);
    let (stdout, _, code) = run_cli(home.path(), &["config", "get", "timer.tick_interval_ms"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "500");
}

#[test]
fn test_config_unknown_key_fails() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["config", "get", "timer.nope"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("unknown key"));
}

#[test]
fn test_status_without_session() {
    let home = tempfile::tempdir().unwrap();
    let status = run_json(home.path(), &["session", "status"]);
    assert!(status["session"].is_null());
    assert!(status["remaining"].is_null());
}

#[test]
fn test_session_lifecycle_persists_between_runs() {
    let home = tempfile::tempdir().unwrap();
    let created = run_json(home.path(), &["session", "create", "focus", "--minutes", "30"]);
    assert_eq!(created["status"], "WAITING");
    assert_eq!(created["plannedDurationMinutes"], 30);

    let started = run_json(home.path(), &["session", "start"]);
    assert_eq!(started["session"]["status"], "RUNNING");
    assert_eq!(started["session"]["id"], created["id"]);

    let status = run_json(home.path(), &["session", "status"]);
    assert_eq!(status["session"]["status"], "RUNNING");
    assert!(status["remaining"]["minutes"].as_f64().unwrap() > 29.0);

    let paused = run_json(home.path(), &["session", "pause"]);
    assert_eq!(paused["status"], "PAUSED");

    let stopped = run_json(home.path(), &["session", "stop", "--notes", "done early"]);
    assert_eq!(stopped["status"], "CANCELLED");
    assert_eq!(stopped["notes"], "done early");

    let status = run_json(home.path(), &["session", "status"]);
    assert!(status["session"].is_null());
}

#[test]
fn test_waiting_session_keeps_links_between_runs() {
    let home = tempfile::tempdir().unwrap();
    let created = run_json(home.path(), &["session", "create"]);
    run_json(
        home.path(),
        &["session", "link", "--task", "t1", "--title", "Write", "--task", "t2", "--title", "Review"],
    );

    let status = run_json(home.path(), &["session", "status"]);
    assert_eq!(status["session"]["id"], created["id"]);
    assert_eq!(status["session"]["status"], "WAITING");
    assert_eq!(status["session"]["taskIds"], serde_json::json!(["t1", "t2"]));
}

#[test]
fn test_create_refuses_to_replace_without_flag() {
    let home = tempfile::tempdir().unwrap();
    let first = run_json(home.path(), &["session", "create"]);

    let (_, stderr, code) = run_cli(home.path(), &["session", "create", "short-break"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("--replace"));

    let second = run_json(home.path(), &["session", "create", "short-break", "--replace"]);
    assert_ne!(second["id"], first["id"]);
    assert_eq!(second["type"], "SHORT_BREAK");
    assert_eq!(second["plannedDurationMinutes"], 5);
}

#[test]
fn test_pause_without_session_fails() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["session", "pause"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("error:"));
}

#[test]
fn test_events_record_session_changes() {
    let home = tempfile::tempdir().unwrap();
    run_json(home.path(), &["session", "create"]);
    run_json(home.path(), &["session", "start"]);

    let events = run_json(home.path(), &["events"]);
    let types: Vec<&str> = events
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["event"]["type"].as_str().unwrap())
        .collect();
    assert_eq!(types, ["SessionCreated", "SessionStarted"]);

    let first_seq = events[0]["seq"].as_i64().unwrap();
    let tail = run_json(home.path(), &["events", "--since", &first_seq.to_string()]);
    assert_eq!(tail.as_array().unwrap().len(), 1);
}

#[test]
fn test_task_list_offline_is_empty() {
    let home = tempfile::tempdir().unwrap();
    let tasks = run_json(home.path(), &["task", "list"]);
    assert_eq!(tasks, Value::Array(Vec::new()));
}
