//! CLI tests for the `orchestrator` binary.
//!
//! Spawns the binary in a temporary workspace and verifies exit codes and
//! output for escalation, locking and report listing.

use std::fs;
use std::path::Path;
use std::process::Command;

use chrono::{TimeZone, Utc};
use orchestrator::core::types::{AgentKind, ExecutionReport};
use orchestrator::exit_codes;
use orchestrator::io::config::{DEFAULT_CONFIG_PATH, OrchestratorConfig, write_config};
use orchestrator::io::report_store::{FileReportStore, ReportStore};
use orchestrator::test_support::result;

/// Workspace whose tracker CLI does not exist.
fn offline_workspace(root: &Path) {
    let mut config = OrchestratorConfig::default();
    config.tracker.program = "definitely-not-gh-xyz".to_string();
    write_config(&root.join(DEFAULT_CONFIG_PATH), &config).expect("write config");
}

fn orchestrator(root: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_orchestrator"));
    cmd.current_dir(root).env_remove("RUST_LOG");
    cmd
}

#[test]
fn unreachable_tracker_escalates() {
    let temp = tempfile::tempdir().expect("tempdir");
    offline_workspace(temp.path());

    let status = orchestrator(temp.path())
        .args(["run", "--issue", "7"])
        .status()
        .expect("orchestrator run");

    assert_eq!(status.code(), Some(exit_codes::ESCALATED));
    assert!(!temp.path().join(".ai/locks/issue-7.lock").exists());
    let logs: Vec<_> = fs::read_dir(temp.path().join(".ai/logs"))
        .expect("logs dir")
        .collect();
    assert_eq!(logs.len(), 1);
}

#[test]
fn locked_issue_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    offline_workspace(temp.path());
    let locks = temp.path().join(".ai/locks");
    fs::create_dir_all(&locks).expect("mkdir");
    fs::write(locks.join("issue-7.lock"), "pid=1\n").expect("write lock");

    let output = orchestrator(temp.path())
        .args(["run", "--issue", "7"])
        .output()
        .expect("orchestrator run");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("already being processed"));
}

#[test]
fn invalid_config_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join(DEFAULT_CONFIG_PATH);
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(&path, "[review]\npass_threshold = 150\n").expect("write");

    let status = orchestrator(temp.path())
        .args(["reports"])
        .status()
        .expect("orchestrator reports");
    assert_eq!(status.code(), Some(exit_codes::INVALID));
}

#[test]
fn reports_lists_saved_runs() {
    let temp = tempfile::tempdir().expect("tempdir");
    offline_workspace(temp.path());
    let store = FileReportStore::new(temp.path().join(".ai/parallel-reports"));
    for (issue_id, ms) in [(3, 2_000), (4, 1_000)] {
        let at = Utc.timestamp_millis_opt(ms).single().expect("timestamp");
        store
            .save(&ExecutionReport::from_results(
                issue_id,
                at,
                at,
                vec![result(AgentKind::Intake, true)],
            ))
            .expect("save");
    }

    let output = orchestrator(temp.path())
        .args(["reports", "--issue", "4"])
        .output()
        .expect("orchestrator reports");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 1);
    assert!(stdout.contains("report: issue=4"));
    assert!(stdout.contains("success=true"));
}
