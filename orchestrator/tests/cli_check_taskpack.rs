//! CLI tests for `orchestrator --check-taskpack` and the missing-config path.
//!
//! Spawns the orchestrator binary and checks exit codes and messages.

use std::fs;
use std::process::Command;

use orchestrator::exit_codes;
use orchestrator::test_support::{TaskPackBuilder, write_taskpack};

#[test]
fn complete_taskpack_validates() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_taskpack(&temp.path().join("tp"), &TaskPackBuilder::default());

    let output = Command::new(env!("CARGO_BIN_EXE_orchestrator"))
        .current_dir(temp.path())
        .args(["--check-taskpack", "tp"])
        .output()
        .expect("orchestrator --check-taskpack");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "[taskpack-validator] OK\n");
}

#[test]
fn broken_taskpack_lists_every_issue() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = temp.path().join("tp");
    write_taskpack(
        &dir,
        &TaskPackBuilder::default().task_yml("id: T-1\nconstraints:\n  allow_network: false\n"),
    );
    fs::remove_file(dir.join("risk.md")).expect("remove");

    let output = Command::new(env!("CARGO_BIN_EXE_orchestrator"))
        .current_dir(temp.path())
        .env("TASKPACK_PATH", "tp")
        .arg("--check-taskpack")
        .output()
        .expect("orchestrator --check-taskpack");

    assert_eq!(output.status.code(), Some(exit_codes::FAILURE));
    let stderr = String::from_utf8_lossy(&output.stderr);
    let failures: Vec<&str> = stderr
        .lines()
        .filter(|line| line.starts_with("[taskpack-validator] FAIL: "))
        .collect();
    assert_eq!(failures.len(), 3, "{stderr}");
    assert!(stderr.contains("task.yml missing required key: title"));
}

/// Verifies a run without TASKPACK_PATH fails before any side effect.
#[test]
fn missing_taskpack_path_fails_without_writing() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = Command::new(env!("CARGO_BIN_EXE_orchestrator"))
        .current_dir(temp.path())
        .env_remove("TASKPACK_PATH")
        .arg("--workspace")
        .arg("self")
        .output()
        .expect("orchestrator");

    assert_eq!(output.status.code(), Some(exit_codes::FAILURE));
    assert!(
        String::from_utf8_lossy(&output.stderr).contains("Missing required env var: TASKPACK_PATH")
    );
    assert!(!temp.path().join(".orchestrator_logs").exists());
}
