//! End-to-end tests for the `sa` binary.
//!
//! Every test runs against its own temporary HOME and workbook. Stdout is
//! not a terminal under the harness, so output is JSON.

use assert_cmd::Command;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Workspace {
    home: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let home = TempDir::new().unwrap();
        let config_dir = home.path().join(".stackaudit");
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(config_dir.join("config.json"), r#"{"batchPauseMs": 0}"#).unwrap();
        Self { home }
    }

    fn db(&self) -> PathBuf {
        self.home.path().join("workbook.db")
    }

    fn sa(&self) -> Command {
        let mut cmd = Command::cargo_bin("sa").unwrap();
        cmd.env("HOME", self.home.path())
            .env("SA_DB", self.db())
            .env_remove("SA_TEST_DB")
            .env_remove("STACKAUDIT_DB")
            .env_remove("SA_INCREMENTAL")
            .env_remove("SA_ACCESS_TOKEN")
            .env_remove("SA_BQ_PROJECT")
            .env_remove("SA_GA4_DATASET")
            .env_remove("RUST_LOG");
        cmd
    }

    fn init(&self) {
        self.sa().arg("init").assert().success();
    }

    fn source(&self) -> PathBuf {
        let dir = self.home.path().join("exports");
        write_export(
            &dir,
            "GA4",
            "Properties",
            &[
                r#"{"key": "1001", "cells": ["Main site", "Europe/Paris"], "last_modified": "2020-01-01T00:00:00Z"}"#,
                r#"{"key": "1002", "cells": ["Blog", "UTC"], "last_modified": "2020-01-01T00:00:00Z"}"#,
            ],
        );
        dir
    }
}

fn write_export(root: &Path, service: &str, resource_type: &str, lines: &[&str]) {
    let dir = root.join(service);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(format!("{resource_type}.jsonl")), lines.join("\n")).unwrap();
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_version_reports_package_version() {
    let ws = Workspace::new();
    let output = ws.sa().arg("version").output().unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert!(json["schemaVersion"].is_number());
}

#[test]
fn test_init_twice_requires_force() {
    let ws = Workspace::new();
    ws.init();
    assert!(ws.db().exists());

    let output = ws.sa().arg("init").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ALREADY_INITIALIZED"));

    ws.sa().args(["init", "--force"]).assert().success();
}

#[test]
fn test_commands_require_init() {
    let ws = Workspace::new();
    let output = ws.sa().args(["sync", "status"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("NOT_INITIALIZED"));
}

#[test]
fn test_sync_status_empty_workbook() {
    let ws = Workspace::new();
    ws.init();

    let output = ws.sa().args(["sync", "status"]).output().unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output), serde_json::json!({}));
}

#[test]
fn test_audit_run_writes_sheet_and_sync_state() {
    let ws = Workspace::new();
    ws.init();
    let source = ws.source();

    let output = ws
        .sa()
        .args(["audit", "run", "GA4", "--resources", "Properties", "--source"])
        .arg(&source)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let report = stdout_json(&output);
    assert_eq!(report["status"], "SUCCESS");
    assert_eq!(report["resources"][0]["mode"], "FULL");
    assert_eq!(report["resources"][0]["recordsSynced"], 2);
    assert_eq!(report["resources"][0]["sheetName"], "GA4 Properties");

    let output = ws
        .sa()
        .args(["sheet", "show", "GA4 Properties"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let sheet = stdout_json(&output);
    assert_eq!(sheet["total"], 2);
    assert_eq!(sheet["rows"][0][0], "1001");
    assert_eq!(sheet["rows"][1][1], "Blog");

    let output = ws.sa().args(["sync", "status"]).output().unwrap();
    let states = stdout_json(&output);
    assert_eq!(states["GA4"]["PROPERTIES"]["lastSyncStatus"], "SUCCESS");
}

#[test]
fn test_second_audit_run_is_incremental() {
    let ws = Workspace::new();
    ws.init();
    let source = ws.source();

    for expected in ["FULL", "INCREMENTAL"] {
        let output = ws
            .sa()
            .args(["audit", "run", "GA4", "-r", "Properties", "--source"])
            .arg(&source)
            .output()
            .unwrap();
        assert!(output.status.success());
        assert_eq!(stdout_json(&output)["resources"][0]["mode"], expected);
    }

    // Records older than the watermark are skipped; the sheet is untouched
    let output = ws.sa().args(["sheet", "show", "GA4 Properties"]).output().unwrap();
    assert_eq!(stdout_json(&output)["total"], 2);

    // Clearing the state sends the next run back to FULL
    ws.sa().args(["sync", "clear", "GA4"]).assert().success();
    let output = ws
        .sa()
        .args(["sync", "mode", "GA4", "Properties"])
        .output()
        .unwrap();
    assert_eq!(stdout_json(&output)["mode"], "FULL");
}

#[test]
fn test_sync_mode_after_failed_first_run_is_full() {
    let ws = Workspace::new();
    ws.init();
    let source = ws.source();

    // No export for Data Streams, so its only record is an ERROR
    ws.sa()
        .args(["audit", "run", "GA4", "-r", "Data Streams", "--source"])
        .arg(&source)
        .output()
        .unwrap();
    let output = ws
        .sa()
        .args(["sync", "status", "--service", "GA4"])
        .output()
        .unwrap();
    assert!(String::from_utf8_lossy(&output.stdout).contains("ERROR"));

    let output = ws
        .sa()
        .args(["sync", "mode", "GA4", "Data Streams"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let plan = stdout_json(&output);
    assert_eq!(plan["mode"], "FULL");
    assert!(plan["watermark"].is_null());
}

#[test]
fn test_audit_run_partial_failure() {
    let ws = Workspace::new();
    ws.init();
    let source = ws.source();

    let output = ws
        .sa()
        .args(["audit", "run", "GA4", "-r", "Properties,Data Streams", "--source"])
        .arg(&source)
        .output()
        .unwrap();
    assert!(output.status.success());
    let report = stdout_json(&output);
    assert_eq!(report["status"], "PARTIAL");
    assert!(report["resources"][1]["error"].is_string());
}

#[test]
fn test_audit_run_rejects_unknown_strategy() {
    let ws = Workspace::new();
    ws.init();
    let source = ws.source();

    let output = ws
        .sa()
        .args(["audit", "run", "GA4", "-r", "Properties", "--strategy", "upsert", "--source"])
        .arg(&source)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(4));
}

#[test]
fn test_sheet_show_missing_sheet() {
    let ws = Workspace::new();
    ws.init();

    let output = ws.sa().args(["sheet", "show", "Nope"]).output().unwrap();
    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("SHEET_NOT_FOUND"));
}

#[test]
fn test_job_list_and_reset_without_token() {
    let ws = Workspace::new();
    ws.init();

    let output = ws.sa().args(["job", "list"]).output().unwrap();
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["jobs"], serde_json::json!([]));
    assert_eq!(json["scheduled"], serde_json::json!([]));

    let output = ws.sa().args(["job", "reset", "heartbeat"]).output().unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["cleared"], Value::Null);
}

#[test]
fn test_job_unknown_family() {
    let ws = Workspace::new();
    ws.init();

    let output = ws.sa().args(["job", "reset", "weekly-digest"]).output().unwrap();
    assert_eq!(output.status.code(), Some(4));
    assert!(String::from_utf8_lossy(&output.stderr).contains("UNKNOWN_JOB_FAMILY"));
}

#[test]
fn test_job_submit_requires_token() {
    let ws = Workspace::new();
    ws.init();

    let output = ws
        .sa()
        .args([
            "job",
            "submit",
            "heartbeat",
            "--project",
            "acme-analytics",
            "--dataset",
            "analytics_123",
        ])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(9));
    assert!(String::from_utf8_lossy(&output.stderr).contains("AUTH_ERROR"));

    // Nothing was persisted
    let output = ws.sa().args(["job", "list"]).output().unwrap();
    assert_eq!(stdout_json(&output)["jobs"], serde_json::json!([]));
}
