//! Shared deterministic types for the orchestrator.
//!
//! These types define stable contracts between the classifier, the pipeline
//! executor, the review aggregator and the report store. They carry no I/O and
//! serialize to the persisted report layout.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Open/closed state of a work item as reported by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

/// Immutable snapshot of a work item, fetched once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueSnapshot {
    pub id: u64,
    pub title: String,
    pub body: String,
    pub labels: BTreeSet<String>,
    pub state: IssueState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

/// Closed set of agents the pipeline knows how to dispatch.
///
/// Declaration order is phase order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgentKind {
    #[serde(rename = "issue")]
    Intake,
    #[serde(rename = "codegen")]
    Codegen,
    #[serde(rename = "review")]
    Review,
}

impl AgentKind {
    pub const ALL: [AgentKind; 3] = [AgentKind::Intake, AgentKind::Codegen, AgentKind::Review];

    /// Stable name used on the command line and in persisted reports.
    pub fn as_str(self) -> &'static str {
        match self {
            AgentKind::Intake => "issue",
            AgentKind::Codegen => "codegen",
            AgentKind::Review => "review",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        AgentKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| anyhow!("unknown agent '{s}'"))
    }
}

/// Derived plan for a single run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPlan {
    pub priority: Priority,
    pub complexity: Complexity,
    /// Phase order; no duplicates, always starts with [`AgentKind::Intake`].
    pub agent_sequence: Vec<AgentKind>,
    pub requirements: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Create,
    Modify,
    Delete,
}

/// A file change reported by an agent through its output manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub action: ChangeAction,
}

/// Normalized outcome of one phase invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResult {
    #[serde(rename = "agent")]
    pub agent_name: AgentKind,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    /// Launch/timeout failure description. Unset for a normal exit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<FileChange>,
    /// Overall review score, only set by the review phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
}

impl AgentResult {
    /// Result for an agent that never produced an exit status.
    pub fn launch_failure(agent: AgentKind, duration_ms: u64, error: impl Into<String>) -> Self {
        Self {
            agent_name: agent,
            success: false,
            duration_ms,
            stdout: None,
            stderr: None,
            error: Some(error.into()),
            changes: Vec::new(),
            score: None,
        }
    }
}

/// One review sub-check measurement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualitySignal {
    pub category: String,
    pub passed: bool,
    /// 0..=100 inclusive.
    pub score: u32,
    pub details: String,
}

/// Aggregate verdict of the review phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewVerdict {
    pub overall_score: u32,
    pub passed: bool,
    pub signals: Vec<QualitySignal>,
    pub rendered_summary: String,
}

/// Durable record of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub issue_id: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub results: Vec<AgentResult>,
    pub total_changes: usize,
    pub success: bool,
}

impl ExecutionReport {
    /// Build a report from the attempted phases.
    ///
    /// `success` is the conjunction of all results and is false for an empty
    /// result sequence.
    pub fn from_results(
        issue_id: u64,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        results: Vec<AgentResult>,
    ) -> Self {
        let total_changes = results.iter().map(|r| r.changes.len()).sum();
        let success = !results.is_empty() && results.iter().all(|r| r.success);
        Self {
            issue_id,
            start_time,
            end_time,
            results,
            total_changes,
            success,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(agent: AgentKind, success: bool, changes: usize) -> AgentResult {
        AgentResult {
            agent_name: agent,
            success,
            duration_ms: 1,
            stdout: None,
            stderr: None,
            error: None,
            changes: (0..changes)
                .map(|i| FileChange {
                    path: format!("src/file_{i}.rs"),
                    action: ChangeAction::Create,
                })
                .collect(),
            score: None,
        }
    }

    #[test]
    fn agent_kind_parses_wire_names() {
        assert_eq!("issue".parse::<AgentKind>().unwrap(), AgentKind::Intake);
        assert_eq!("review".parse::<AgentKind>().unwrap(), AgentKind::Review);
        assert!("pr".parse::<AgentKind>().is_err());
    }

    #[test]
    fn report_success_is_and_of_results() {
        let now = Utc::now();
        let report = ExecutionReport::from_results(
            7,
            now,
            now,
            vec![
                result(AgentKind::Intake, true, 0),
                result(AgentKind::Codegen, false, 2),
            ],
        );
        assert!(!report.success);
        assert_eq!(report.total_changes, 2);

        let report = ExecutionReport::from_results(
            7,
            now,
            now,
            vec![
                result(AgentKind::Intake, true, 1),
                result(AgentKind::Codegen, true, 2),
            ],
        );
        assert!(report.success);
        assert_eq!(report.total_changes, 3);
    }

    #[test]
    fn empty_report_is_never_successful() {
        let now = Utc::now();
        let report = ExecutionReport::from_results(1, now, now, Vec::new());
        assert!(!report.success);
    }

    #[test]
    fn agent_result_serializes_with_stable_names() {
        let value = serde_json::to_value(result(AgentKind::Intake, true, 0)).expect("json");
        assert_eq!(value["agent"], "issue");
        assert_eq!(value["durationMs"], 1);
        assert!(value.get("changes").is_none());
        assert!(value.get("stdout").is_none());
    }
}
