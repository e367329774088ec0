//! Smoke tests for the comprobador CLI
//!
//! These exercise the binary end to end without needing a running app.

#![allow(deprecated)] // Allow deprecated Command::cargo_bin until assert_cmd is updated

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Get a command for the comprobador binary
fn comprobador() -> Command {
    let mut cmd = Command::cargo_bin("comprobador").expect("comprobador binary should exist");
    cmd.env_remove("RUST_LOG")
        .env_remove("COMPROBAR_BASE_URL")
        .env_remove("COMPROBAR_ARTIFACTS_DIR");
    cmd
}

const TEACHER_HISTORY: &str = r"
name: teacher history
expect: teacher
steps:
  - kind: navigate
    url: /
  - kind: authenticate_as
    role: teacher
    username: ${TEACHER_USER}
    password: ${TEACHER_PASS}
  - kind: interact
    ref: history-tab
    action:
      type: click
  - kind: assert_visible
    ref: history-search
  - kind: capture
    label: history
";

fn write(dir: &TempDir, name: &str, yaml: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, yaml).unwrap();
    path
}

// ============================================================================
// Basic CLI Tests
// ============================================================================

#[test]
fn test_version_flag() {
    comprobador()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_help_flag() {
    comprobador()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("refs"));
}

#[test]
fn test_no_args_fails() {
    comprobador().assert().failure();
}

#[test]
fn test_run_subcommand_help() {
    comprobador()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--base-url"))
        .stdout(predicate::str::contains("--jobs"));
}

// ============================================================================
// Validate
// ============================================================================

#[test]
fn test_validate_good_file() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "teacher.yaml", TEACHER_HISTORY);
    comprobador()
        .args(["validate", "--color", "never"])
        .arg(&path)
        .assert()
        .success()
        .stderr(predicate::str::contains("PASS"))
        .stderr(predicate::str::contains("1 scenarios"));
}

#[test]
fn test_validate_unknown_ref() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "typo.yaml",
        &TEACHER_HISTORY.replace("history-search", "history-serach"),
    );
    comprobador()
        .args(["validate", "--color", "never"])
        .arg(&path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("history-serach"))
        .stderr(predicate::str::contains("Validation failed"));
}

#[test]
fn test_validate_malformed_scenario() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "student.yaml",
        "name: student\nsteps:\n  - kind: authenticate_as\n    role: student\n",
    );
    comprobador()
        .args(["validate", "--color", "never"])
        .arg(&path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("FAIL"));
}

#[test]
fn test_validate_override_adds_ref() {
    let dir = TempDir::new().unwrap();
    let scenario = write(
        &dir,
        "loans.yaml",
        "name: loans\nsteps:\n  - kind: assert_visible\n    ref: loan-table\n",
    );
    let selectors = write(
        &dir,
        "site.yaml",
        "refs:\n  loan-table:\n    - by: css\n      css: table.loans\n",
    );
    comprobador()
        .arg("validate")
        .arg(&scenario)
        .arg("--selectors")
        .arg(&selectors)
        .assert()
        .success();
}

// ============================================================================
// Refs and machine
// ============================================================================

#[test]
fn test_refs_lists_table() {
    comprobador()
        .arg("refs")
        .assert()
        .success()
        .stdout(predicate::str::contains("teacher-entry"))
        .stdout(predicate::str::contains("role=button[name=Cerrar Sesión]"));
}

#[test]
fn test_machine_dot() {
    comprobador()
        .args(["machine", "--format", "dot"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("digraph Login"));
}

// ============================================================================
// Run
// ============================================================================

#[test]
fn test_run_missing_file_is_usage_error() {
    comprobador()
        .args(["run", "/nonexistent/scenario.yaml"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("scenario file not found"));
}

#[test]
fn test_run_missing_config_is_usage_error() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "teacher.yaml", TEACHER_HISTORY);
    comprobador()
        .arg("run")
        .arg(&path)
        .args(["--config", "/nonexistent/comprobar.yaml"])
        .assert()
        .code(2);
}

#[cfg(feature = "browser")]
#[test]
fn test_run_without_browser_reports_errored() {
    let dir = TempDir::new().unwrap();
    let scenario = write(&dir, "teacher.yaml", TEACHER_HISTORY);
    let config = write(
        &dir,
        "comprobar.yaml",
        "driver:\n  executable_path: /nonexistent/chromium\nwrite_reports: false\n",
    );
    let report = dir.path().join("batch.json");
    comprobador()
        .arg("run")
        .arg(&scenario)
        .arg("--config")
        .arg(&config)
        .arg("--report")
        .arg(&report)
        .args(["--color", "never"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("ERROR"));

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(json["scenarios"][0]["status"], "errored");
    assert_eq!(
        json["scenarios"][0]["steps"][0]["outcome"]["kind"],
        "transport_fault"
    );
}
