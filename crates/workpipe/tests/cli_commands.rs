#![cfg(all(unix, feature = "cli"))]

use std::process::{Command, Output};

fn workpipe(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_workpipe"))
        .arg("--log-level")
        .arg("error")
        .args(args)
        .env_remove("WORKPIPE_WORKERS")
        .env_remove("WORKPIPE_TRANSPORT")
        .env_remove("WORKPIPE_TIMEOUT")
        .env_remove("WORKPIPE_MAX_PAYLOAD")
        .env_remove("WORKPIPE_FORMAT")
        .output()
        .expect("workpipe should run")
}

fn json_lines(output: &Output) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("every stdout line should be json"))
        .collect()
}

#[test]
fn run_pretty_matches_classic_driver_output() {
    let output = workpipe(&["--format", "pretty", "run"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let expected: Vec<String> = (0..16)
        .map(|i| format!("Checked packet, length={}", 1usize << i))
        .collect();
    assert_eq!(stdout.lines().collect::<Vec<_>>(), expected);
}

#[test]
fn run_json_reports_packets_and_summary() {
    let output = workpipe(&[
        "--format",
        "json",
        "run",
        "--workers",
        "3",
        "--count",
        "10",
        "--transport",
        "unix-pair",
    ]);
    assert!(output.status.success());

    let records = json_lines(&output);
    assert_eq!(records.len(), 11);
    for (i, record) in records[..10].iter().enumerate() {
        assert_eq!(record["record"], "packet");
        assert_eq!(record["length"], 1u64 << i);
        assert_eq!(record["ok"], true);
    }

    let summary = &records[10];
    assert_eq!(summary["record"], "summary");
    assert_eq!(summary["workers"], 3);
    assert_eq!(summary["transport"], "unix-pair");
    assert_eq!(summary["stats"]["completed"], 10);
    assert_eq!(summary["stats"]["peak_channel_readers"], 1);
}

#[test]
fn run_rejects_packets_over_payload_limit() {
    let output = workpipe(&["run", "--count", "12", "--max-payload", "1024"]);
    assert_eq!(output.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&output.stderr).contains("payload limit"));
}

#[test]
fn run_rejects_zero_workers() {
    let output = workpipe(&["run", "--workers", "0"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn workers_can_come_from_environment() {
    let output = Command::new(env!("CARGO_BIN_EXE_workpipe"))
        .args(["--log-level", "error", "--format", "json", "run", "--count", "4"])
        .env("WORKPIPE_WORKERS", "5")
        .output()
        .expect("workpipe should run");
    assert!(output.status.success());

    let records = json_lines(&output);
    assert_eq!(records.last().unwrap()["workers"], 5);
}

#[test]
fn stress_delivers_every_marker_to_its_caller() {
    let output = workpipe(&[
        "--format",
        "json",
        "stress",
        "--callers",
        "6",
        "--requests",
        "50",
        "--workers",
        "3",
    ]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let records = json_lines(&output);
    assert_eq!(records.len(), 1);
    let report = &records[0];
    assert_eq!(report["record"], "stress");
    assert_eq!(report["total"], 300);
    assert_eq!(report["verified"], 300);
    assert_eq!(report["mismatched"], 0);
    assert_eq!(report["errors"], 0);
    assert_eq!(report["stats"]["orphaned_responses"], 0);
}

#[test]
fn invalid_timeout_is_usage_error() {
    let output = workpipe(&["stress", "--timeout", "soon"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn version_prints_package_version() {
    let output = workpipe(&["version"]);
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        format!("workpipe {}", env!("CARGO_PKG_VERSION"))
    );

    let extended = workpipe(&["version", "--extended"]);
    let stdout = String::from_utf8_lossy(&extended.stdout);
    assert!(stdout.contains("transports: pipe, unix-pair"));
    assert!(stdout.contains("features: async="));
}
