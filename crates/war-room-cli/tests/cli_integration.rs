use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("{prefix}-{}", ulid::Ulid::new()));
    fs::create_dir_all(&dir)
        .unwrap_or_else(|err| panic!("failed to create temp dir {}: {err}", dir.display()));
    dir
}

fn run_wr<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_wr"))
        .args(args)
        .env_remove("WAR_ROOM_SESSIONS_DIR")
        .env_remove("WAR_ROOM_SCENARIO")
        .output()
        .unwrap_or_else(|err| panic!("failed to execute wr binary: {err}"))
}

fn run_json<I, S>(args: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_wr(args);
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "wr command failed (status={}):\nstdout:\n{}\nstderr:\n{}",
            output.status, stdout, stderr
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    serde_json::from_str(&stdout)
        .unwrap_or_else(|err| panic!("stdout is not valid JSON: {err}\nstdout:\n{stdout}"))
}

fn as_i64(value: &Value, key: &str) -> i64 {
    value
        .get(key)
        .and_then(Value::as_i64)
        .unwrap_or_else(|| panic!("missing integer field `{key}` in payload: {value}"))
}

fn as_str<'a>(value: &'a Value, key: &str) -> &'a str {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("missing string field `{key}` in payload: {value}"))
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap_or_else(|| panic!("path should be valid UTF-8: {}", path.display()))
}

fn repo_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .canonicalize()
        .unwrap_or_else(|err| panic!("failed to canonicalize repo root: {err}"))
}

fn sample_scenario() -> PathBuf {
    repo_root().join("scenarios/campus_speech.json")
}

#[test]
fn score_then_replay_returns_the_saved_record() {
    let sessions = unique_temp_dir("war-room-cli-score");
    let scored = run_json([
        "--sessions-dir",
        path_str(&sessions),
        "score",
        "--statement",
        "Suspension pending a full and fair investigation. We will not be making further comment.",
        "--respond-now",
        "Respond now with holding statement",
        "--bbc-request",
        "Decline and issue written statement",
        "--charity-story",
        "Hold",
        "--created-at",
        "2025-03-04T09:15:30Z",
    ]);

    assert_eq!(as_str(&scored, "contract_version"), "cli.v1");
    assert_eq!(as_str(&scored, "session_id"), "session_20250304_091530");
    let record = scored.get("record").unwrap_or_else(|| panic!("missing record: {scored}"));
    assert_eq!(as_i64(record, "overall"), 67);
    assert_eq!(as_str(record, "timestamp_utc"), "20250304_091530");
    let statement = record
        .get("statement_breakdown")
        .unwrap_or_else(|| panic!("missing statement_breakdown: {record}"));
    assert_eq!(as_i64(statement, "score"), 45);

    let listed = run_json(["--sessions-dir", path_str(&sessions), "sessions", "list"]);
    assert_eq!(listed.get("sessions"), Some(&serde_json::json!(["session_20250304_091530"])));

    let shown = run_json([
        "--sessions-dir",
        path_str(&sessions),
        "sessions",
        "show",
        "--id",
        "session_20250304_091530",
    ]);
    assert_eq!(shown.get("record"), Some(record));

    let _ = fs::remove_dir_all(&sessions);
}

#[test]
fn same_second_scores_are_both_kept() {
    let sessions = unique_temp_dir("war-room-cli-collide");
    let args = |statement: &'static str| {
        vec![
            "--sessions-dir".to_string(),
            path_str(&sessions).to_string(),
            "score".to_string(),
            "--statement".to_string(),
            statement.to_string(),
            "--created-at".to_string(),
            "2025-03-04T09:15:30Z".to_string(),
        ]
    };

    let first = run_json(args("first"));
    let second = run_json(args("second"));
    assert_eq!(as_str(&first, "session_id"), "session_20250304_091530");
    assert_eq!(as_str(&second, "session_id"), "session_20250304_091530_2");

    let listed = run_json(["--sessions-dir", path_str(&sessions), "sessions", "list"]);
    let count = listed.get("sessions").and_then(Value::as_array).map_or(0, Vec::len);
    assert_eq!(count, 2);

    let _ = fs::remove_dir_all(&sessions);
}

#[test]
fn empty_statement_file_scores_zero() {
    let dir = unique_temp_dir("war-room-cli-empty");
    let statement_path = dir.join("statement.txt");
    fs::write(&statement_path, "   \n")
        .unwrap_or_else(|err| panic!("failed to write statement file: {err}"));

    let scored = run_json([
        "--sessions-dir",
        path_str(&dir.join("sessions")),
        "score",
        "--statement-file",
        path_str(&statement_path),
    ]);
    let record = scored.get("record").unwrap_or_else(|| panic!("missing record: {scored}"));
    assert_eq!(as_i64(record, "overall"), 0);
    assert_eq!(
        record.get("statement_breakdown").and_then(|breakdown| breakdown.get("notes")),
        Some(&serde_json::json!(["No statement provided."]))
    );

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn showing_unknown_session_fails_with_not_found() {
    let sessions = unique_temp_dir("war-room-cli-missing");
    let output = run_wr([
        "--sessions-dir",
        path_str(&sessions),
        "sessions",
        "show",
        "--id",
        "session_19990101_000000",
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("session not found"), "unexpected stderr: {stderr}");

    let _ = fs::remove_dir_all(&sessions);
}

#[test]
fn scoring_into_unwritable_location_fails() {
    let dir = unique_temp_dir("war-room-cli-blocked");
    let blocker = dir.join("sessions");
    fs::write(&blocker, "occupied").unwrap_or_else(|err| panic!("failed to write blocker: {err}"));

    let output = run_wr(["--sessions-dir", path_str(&blocker), "score", "--statement", "hello"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to save session"), "unexpected stderr: {stderr}");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn scenario_feed_shows_events_up_to_minute() {
    let scenario = sample_scenario();
    let feed = run_json(["scenario", "feed", "--scenario", path_str(&scenario), "--minute", "8"]);
    assert_eq!(as_i64(&feed, "minute"), 8);

    let lines = feed
        .get("lines")
        .and_then(Value::as_array)
        .unwrap_or_else(|| panic!("missing lines: {feed}"));
    assert_eq!(lines.len(), 5);
    assert_eq!(
        lines[1].as_str(),
        Some(
            "T+2m - Tweet @StudentVoiceUK (48,200 followers): Students deserve to know what the college is doing about this."
        )
    );

    let clamped = run_json(["scenario", "feed", "--scenario", path_str(&scenario), "--minute", "600"]);
    assert_eq!(as_i64(&clamped, "minute"), 60);
    assert_eq!(clamped.get("lines").and_then(Value::as_array).map_or(0, Vec::len), 12);
}

#[test]
fn scenario_show_reports_title_and_event_count() {
    let shown = run_json(["scenario", "show", "--scenario", path_str(&sample_scenario())]);
    assert_eq!(as_str(&shown, "title"), "Lecturer's post sparks campus free speech row");
    assert_eq!(as_i64(&shown, "events"), 12);
    assert_eq!(as_str(&shown, "baseline_sentiment"), "neutral-to-negative");
}

#[test]
fn options_list_three_decision_points() {
    let options = run_json(["options"]);
    let points = options
        .get("decision_points")
        .and_then(Value::as_array)
        .unwrap_or_else(|| panic!("missing decision_points: {options}"));
    let keys = points.iter().map(|point| as_str(point, "key")).collect::<Vec<_>>();
    assert_eq!(keys, vec!["respond_now", "bbc_request", "charity_story"]);
}

#[test]
fn log_filter_sends_diagnostics_to_stderr_only() {
    let output = Command::new(env!("CARGO_BIN_EXE_wr"))
        .args(["scenario", "show", "--scenario", path_str(&sample_scenario())])
        .env_remove("WAR_ROOM_SESSIONS_DIR")
        .env_remove("WAR_ROOM_SCENARIO")
        .env("WAR_ROOM_LOG", "debug")
        .output()
        .unwrap_or_else(|err| panic!("failed to execute wr binary: {err}"));
    assert!(output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("loaded scenario"), "unexpected stderr: {stderr}");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let shown: Value = serde_json::from_str(stdout.trim())
        .unwrap_or_else(|err| panic!("stdout is not valid JSON: {err}\nstdout:\n{stdout}"));
    assert_eq!(as_i64(&shown, "events"), 12);
}
