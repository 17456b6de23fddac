//! Binary-level tests for the offline commands.

use std::io::Write;
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

fn relay_binary() -> String {
    env!("CARGO_BIN_EXE_worklog-relay").to_string()
}

/// Runs the binary with an isolated config directory.
fn relay(temp: &TempDir, args: &[&str], stdin: Option<&str>) -> Output {
    let mut child = Command::new(relay_binary())
        .current_dir(temp.path())
        .env("HOME", temp.path())
        .env("XDG_CONFIG_HOME", temp.path().join(".config"))
        .env_remove("RUST_LOG")
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to start worklog-relay");

    let mut pipe = child.stdin.take().unwrap();
    if let Some(input) = stdin {
        pipe.write_all(input.as_bytes()).unwrap();
    }
    drop(pipe);

    child.wait_with_output().unwrap()
}

const LONG_ENTRY: &str = r#"{
    "event_id": 1,
    "metadata": {"action": "updated", "request_body": "{\"server_deleted_at\":null}"},
    "payload": {
        "id": 99,
        "description": "  ABC-7 on-call {jira}  ",
        "start": "2024-01-10T09:00:00+01:00",
        "stop": "2024-01-10T22:30:00+01:00",
        "duration": 48600
    }
}"#;

#[test]
fn test_plan_from_file() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("event.json"), LONG_ENTRY).unwrap();

    let output = relay(&temp, &["plan", "event.json"], None);
    assert!(
        output.status.success(),
        "plan should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["description"], "ABC-7 on-call [OT]");
    assert_eq!(lines[0]["timeSpentMinutes"], 495);
    assert_eq!(lines[1]["description"], "ABC-7 on-call");
    assert_eq!(lines[1]["timeSpentMinutes"], 480);
}

#[test]
fn test_plan_from_stdin_with_config_file() {
    let temp = TempDir::new().unwrap();
    std::fs::write(
        temp.path().join("relay.toml"),
        "[allocation]\nalign_to_minutes = 15\n",
    )
    .unwrap();
    let event = r#"{
        "metadata": {"action": "created"},
        "payload": {
            "description": "ABC-8 sync",
            "start": "2024-01-10T09:00:00+01:00",
            "stop": "2024-01-10T09:38:00+01:00",
            "duration": "PT38M"
        }
    }"#;

    let output = relay(&temp, &["--config", "relay.toml", "plan", "-"], Some(event));
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let line: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(line["timeSpentMinutes"], 45);
    assert_eq!(line["kind"], "regular");
}

#[test]
fn test_plan_ignored_event_succeeds() {
    let temp = TempDir::new().unwrap();
    let deleted = r#"{
        "metadata": {"action": "updated", "request_body": "{\"deleted_at\":\"2024-01-10T10:00:00Z\"}"},
        "payload": {
            "description": "ABC-9",
            "start": "2024-01-10T09:00:00Z",
            "stop": "2024-01-10T10:00:00Z",
            "duration": 3600
        }
    }"#;

    let output = relay(&temp, &["plan", "-"], Some(deleted));
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("ignored: time entry was deleted"));
}

#[test]
fn test_invalid_config_fails_startup() {
    let temp = TempDir::new().unwrap();
    std::fs::write(
        temp.path().join("relay.toml"),
        "[allocation]\novertime_multiplier = -1\n",
    )
    .unwrap();

    let output = relay(&temp, &["--config", "relay.toml", "show-config"], None);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid configuration"));
}

#[test]
fn test_show_config_redacts_token() {
    let temp = TempDir::new().unwrap();
    let output = Command::new(relay_binary())
        .current_dir(temp.path())
        .env("HOME", temp.path())
        .env("XDG_CONFIG_HOME", temp.path().join(".config"))
        .env("WR_TARGETS__JIRA__TOKEN", "super-secret")
        .arg("show-config")
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("[REDACTED]"));
    assert!(!stdout.contains("super-secret"));
}
