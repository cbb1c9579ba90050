//! Command line smoke tests
//!
//! None of these reach a real sending service: they stop at argument or
//! configuration errors, work on local files only, or send to a closed port.

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn mailcast() -> Command {
    let mut cmd = Command::cargo_bin("mailcast").unwrap();
    cmd.env_remove("MAILCAST_API_TOKEN").env_remove("RUST_LOG");
    cmd
}

fn write_inputs(dir: &Path) -> (PathBuf, PathBuf) {
    let message = dir.join("message.json");
    fs::write(
        &message,
        r#"{"from":{"email":"shop@example.com"},"subject":"Hello","text":"Hi {{name}}"}"#,
    )
    .unwrap();
    let recipients = dir.join("recipients.json");
    fs::write(
        &recipients,
        r#"[{"email":"a@example.com","name":"A"},{"email":"b@example.com"},{"email":"c@example.com"}]"#,
    )
    .unwrap();
    (message, recipients)
}

#[test]
fn test_help_lists_commands() {
    let output = mailcast().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["send", "retry", "export"] {
        assert!(stdout.contains(command), "help is missing {command}");
    }
}

#[test]
fn test_concurrency_out_of_range_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let (message, recipients) = write_inputs(temp_dir.path());

    for value in ["0", "65"] {
        mailcast()
            .args(["--concurrency", value, "send", "--message"])
            .arg(&message)
            .arg("--recipients")
            .arg(&recipients)
            .assert()
            .failure();
    }
}

#[test]
fn test_send_without_token_is_a_configuration_error() {
    let temp_dir = TempDir::new().unwrap();
    let (message, recipients) = write_inputs(temp_dir.path());

    let output = mailcast()
        .args(["--no-progress", "send", "--message"])
        .arg(&message)
        .arg("--recipients")
        .arg(&recipients)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("MAILCAST_API_TOKEN"), "stderr: {stderr}");
}

#[test]
fn test_unreachable_service_fails_every_batch() {
    let temp_dir = TempDir::new().unwrap();
    let (message, recipients) = write_inputs(temp_dir.path());
    let failures_dir = temp_dir.path().join("failures");

    let output = mailcast()
        .env("MAILCAST_API_TOKEN", "test-token")
        .args([
            "--api-url",
            "http://127.0.0.1:1",
            "--max-retries",
            "0",
            "--batch-size",
            "2",
            "--no-progress",
            "--output-format",
            "json",
            "--failures-dir",
        ])
        .arg(&failures_dir)
        .args(["send", "--message"])
        .arg(&message)
        .arg("--recipients")
        .arg(&recipients)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(3));
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["total_jobs"], 2);
    assert_eq!(summary["failed_jobs"], 2);
    assert_eq!(summary["failed_recipients"], 3);
    assert_eq!(summary["exit_code"], 3);

    let written: Vec<_> = fs::read_dir(&failures_dir)
        .unwrap()
        .filter_map(Result::ok)
        .collect();
    assert_eq!(written.len(), 1);
    let name = written[0].file_name().to_string_lossy().to_string();
    assert!(name.starts_with("failed-") && name.ends_with(".json"));
}

#[test]
fn test_retry_with_only_terminal_failures_does_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let (message, _) = write_inputs(temp_dir.path());
    let failures = temp_dir.path().join("failed.json");
    fs::write(
        &failures,
        r#"[{"email":"a@example.com","error":"API error 400: bad request","error_code":400,"retryable":false}]"#,
    )
    .unwrap();

    let output = mailcast()
        .args(["retry", "--failures"])
        .arg(&failures)
        .arg("--message")
        .arg(&message)
        .output()
        .unwrap();

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Nothing to retry"));
}

#[test]
fn test_export_writes_csv_to_stdout() {
    let temp_dir = TempDir::new().unwrap();
    let failures = temp_dir.path().join("failed.json");
    fs::write(
        &failures,
        r#"[{"email":"a@example.com","name":"A","error":"request timeout: 30s","error_code":0,"retryable":true,"variables_flat":{"plan":"pro"}}]"#,
    )
    .unwrap();

    let output = mailcast()
        .args(["export", "--failures"])
        .arg(&failures)
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout,
        "email,name,error,error_code,retryable,plan\na@example.com,A,request timeout: 30s,0,true,pro\n"
    );
}
