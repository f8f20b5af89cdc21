//! Issue tracker adapter.
//!
//! The orchestrator only needs four operations from the tracker: fetch an
//! issue snapshot, add labels, remove labels and post a comment. The
//! [`IssueTracker`] trait keeps the pipeline independent of the backend; the
//! production implementation shells out to the `gh` CLI.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::{Command, Output};

use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::core::types::{IssueSnapshot, IssueState};
use crate::io::config::TrackerConfig;

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("issue #{0} not found")]
    NotFound(u64),
    #[error("tracker transport error: {0}")]
    Transport(String),
    #[error("unexpected tracker response: {0}")]
    Parse(String),
}

/// Operations consumed from the issue tracker.
pub trait IssueTracker {
    fn fetch(&self, id: u64) -> Result<IssueSnapshot, TrackerError>;
    fn add_labels(&self, id: u64, labels: &[String]) -> Result<(), TrackerError>;
    fn remove_labels(&self, id: u64, labels: &[String]) -> Result<(), TrackerError>;
    fn comment(&self, id: u64, body: &str) -> Result<(), TrackerError>;
}

/// Tracker backed by `gh issue ...` subprocess calls.
#[derive(Debug, Clone)]
pub struct GhTracker {
    program: String,
    repo: Option<String>,
    workdir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct GhIssue {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    labels: Vec<GhLabel>,
    state: String,
}

#[derive(Debug, Deserialize)]
struct GhLabel {
    name: String,
}

impl GhTracker {
    pub fn new(config: &TrackerConfig, workdir: impl Into<PathBuf>) -> Self {
        Self {
            program: config.program.clone(),
            repo: config.repo.clone(),
            workdir: workdir.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<Output, TrackerError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("issue").args(args).current_dir(&self.workdir);
        if let Some(repo) = &self.repo {
            cmd.arg("--repo").arg(repo);
        }
        cmd.output().map_err(|err| {
            TrackerError::Transport(format!(
                "spawn {} issue {}: {err}",
                self.program,
                args.join(" ")
            ))
        })
    }

    fn run_checked(&self, id: u64, args: &[&str]) -> Result<Output, TrackerError> {
        let output = self.run(args)?;
        if output.status.success() {
            return Ok(output);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if is_not_found(&stderr) {
            return Err(TrackerError::NotFound(id));
        }
        Err(TrackerError::Transport(format!(
            "{} issue {} failed: {stderr}",
            self.program,
            args.first().copied().unwrap_or_default()
        )))
    }

    fn edit_labels(&self, id: u64, flag: &str, labels: &[String]) -> Result<(), TrackerError> {
        if labels.is_empty() {
            return Ok(());
        }
        let number = id.to_string();
        let joined = labels.join(",");
        self.run_checked(id, &["edit", &number, flag, &joined])?;
        Ok(())
    }
}

impl IssueTracker for GhTracker {
    #[instrument(skip(self))]
    fn fetch(&self, id: u64) -> Result<IssueSnapshot, TrackerError> {
        let number = id.to_string();
        let output = self.run_checked(
            id,
            &["view", &number, "--json", "number,title,body,labels,state"],
        )?;
        let snapshot = parse_issue(&output.stdout)?;
        debug!(labels = snapshot.labels.len(), "issue fetched");
        Ok(snapshot)
    }

    #[instrument(skip(self))]
    fn add_labels(&self, id: u64, labels: &[String]) -> Result<(), TrackerError> {
        self.edit_labels(id, "--add-label", labels)
    }

    #[instrument(skip(self))]
    fn remove_labels(&self, id: u64, labels: &[String]) -> Result<(), TrackerError> {
        self.edit_labels(id, "--remove-label", labels)
    }

    #[instrument(skip(self, body), fields(body_len = body.len()))]
    fn comment(&self, id: u64, body: &str) -> Result<(), TrackerError> {
        let number = id.to_string();
        self.run_checked(id, &["comment", &number, "--body", body])?;
        Ok(())
    }
}

fn is_not_found(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("could not resolve to an issue") || lower.contains("not found")
}

fn parse_issue(stdout: &[u8]) -> Result<IssueSnapshot, TrackerError> {
    let issue: GhIssue =
        serde_json::from_slice(stdout).map_err(|err| TrackerError::Parse(err.to_string()))?;
    let state = match issue.state.to_lowercase().as_str() {
        "open" => IssueState::Open,
        "closed" => IssueState::Closed,
        other => {
            warn!(state = other, "unknown issue state");
            return Err(TrackerError::Parse(format!("unknown issue state '{other}'")));
        }
    };
    Ok(IssueSnapshot {
        id: issue.number,
        title: issue.title,
        body: issue.body.unwrap_or_default(),
        labels: issue
            .labels
            .into_iter()
            .map(|l| l.name)
            .collect::<BTreeSet<_>>(),
        state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_gh_issue_json() {
        let json = br#"{"number":42,"title":"Add exporter","body":null,
            "labels":[{"name":"P1-High"},{"name":"bug"}],"state":"OPEN"}"#;
        let issue = parse_issue(json).expect("parse");
        assert_eq!(issue.id, 42);
        assert_eq!(issue.body, "");
        assert_eq!(issue.state, IssueState::Open);
        assert!(issue.labels.contains("P1-High"));
        assert_eq!(issue.labels.len(), 2);
    }

    #[test]
    fn rejects_unknown_state() {
        let json = br#"{"number":1,"title":"t","body":"","labels":[],"state":"MERGED"}"#;
        assert!(matches!(parse_issue(json), Err(TrackerError::Parse(_))));
    }

    #[test]
    fn not_found_detection() {
        assert!(is_not_found(
            "GraphQL: Could not resolve to an issue or pull request with the number of 999."
        ));
        assert!(!is_not_found("HTTP 502: Bad Gateway"));
    }

    #[test]
    fn missing_program_is_transport_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tracker = GhTracker::new(
            &TrackerConfig {
                program: "definitely-not-gh-xyz".to_string(),
                repo: None,
            },
            temp.path(),
        );
        assert!(matches!(tracker.fetch(1), Err(TrackerError::Transport(_))));
    }

    #[test]
    fn empty_label_edits_are_noops() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tracker = GhTracker::new(
            &TrackerConfig {
                program: "definitely-not-gh-xyz".to_string(),
                repo: None,
            },
            temp.path(),
        );
        tracker.add_labels(1, &[]).expect("no-op");
    }
}
