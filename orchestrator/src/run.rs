//! Top-level run for one issue: fetch, classify, execute, persist, label.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use crate::core::classifier::classify;
use crate::core::types::{ExecutionReport, IssueState, TaskPlan};
use crate::io::agents::AgentRunner;
use crate::io::config::LabelConfig;
use crate::io::labels::LabelSync;
use crate::io::lock::{IssueLock, LockError};
use crate::io::report_store::ReportStore;
use crate::io::tracker::{IssueTracker, TrackerError};
use crate::pipeline::execute_pipeline;

/// Failures that abort a run or its success reporting. Agent failures are
/// not errors; they show up as `success == false` in the report.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to fetch issue: {0}")]
    Fetch(#[from] TrackerError),
    #[error(transparent)]
    Locked(#[from] LockError),
    #[error("failed to persist execution report for issue #{}: {cause:#}", .report.issue_id)]
    ReportPersist {
        report: Box<ExecutionReport>,
        cause: anyhow::Error,
    },
}

/// A finished run whose report was persisted.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub plan: TaskPlan,
    pub report: ExecutionReport,
    pub report_path: PathBuf,
}

/// Collaborators of a run.
pub struct RunDeps<'a, T: ?Sized, R: ?Sized, S: ?Sized> {
    pub tracker: &'a T,
    pub runner: &'a R,
    pub store: &'a S,
    pub labels: &'a LabelConfig,
    pub locks_dir: &'a Path,
}

/// Process one issue end to end.
///
/// Holds the per-issue lock for the whole run. A fetch failure escalates the
/// issue and returns before any phase runs; otherwise a report is always
/// written, partial when a phase failed.
#[instrument(skip(deps))]
pub fn run_issue<T, R, S>(
    issue_id: u64,
    deps: &RunDeps<'_, T, R, S>,
) -> Result<RunOutcome, RunError>
where
    T: IssueTracker + ?Sized,
    R: AgentRunner + ?Sized,
    S: ReportStore + ?Sized,
{
    let _lock = IssueLock::acquire(deps.locks_dir, issue_id)?;
    let vocab = deps.labels;
    let labels = LabelSync::new(deps.tracker, issue_id);
    let start_time = Utc::now();

    let issue = match deps.tracker.fetch(issue_id) {
        Ok(issue) => issue,
        Err(err) => {
            error!(err = %err, "issue fetch failed, escalating");
            labels.update(
                &[vocab.run_failed.as_str(), vocab.escalated.as_str()],
                &[vocab.running.as_str(), vocab.execute.as_str()],
            );
            return Err(RunError::Fetch(err));
        }
    };
    info!(title = %issue.title, labels = issue.labels.len(), "processing issue");
    if issue.state == IssueState::Closed {
        warn!("issue is closed, running anyway");
    }

    labels.update(&[vocab.running.as_str()], &[vocab.execute.as_str()]);

    let plan = classify(&issue);
    info!(
        priority = ?plan.priority,
        complexity = ?plan.complexity,
        agents = ?plan.agent_sequence,
        "task planned"
    );
    labels.update(&[vocab.priority_label(plan.priority)], &[]);

    let results = execute_pipeline(issue_id, &plan, deps.runner, &labels, vocab);
    let report = ExecutionReport::from_results(issue_id, start_time, Utc::now(), results);

    let report_path = match deps.store.save(&report) {
        Ok(path) => path,
        Err(cause) => {
            error!(err = %format!("{cause:#}"), "failed to persist execution report");
            labels.update(&[vocab.run_failed.as_str()], &[vocab.running.as_str()]);
            return Err(RunError::ReportPersist {
                report: Box::new(report),
                cause,
            });
        }
    };

    if report.success {
        labels.update(&[vocab.run_completed.as_str()], &[vocab.running.as_str()]);
    } else {
        labels.update(&[vocab.run_failed.as_str()], &[vocab.running.as_str()]);
    }
    info!(
        success = report.success,
        total_changes = report.total_changes,
        path = %report_path.display(),
        "run finished"
    );

    Ok(RunOutcome {
        plan,
        report,
        report_path,
    })
}

/// Fetch and classify without executing; labels the issue as planned.
#[instrument(skip(tracker, vocab))]
pub fn plan_issue<T: IssueTracker + ?Sized>(
    issue_id: u64,
    tracker: &T,
    vocab: &LabelConfig,
) -> Result<TaskPlan, TrackerError> {
    let issue = tracker.fetch(issue_id)?;
    let plan = classify(&issue);
    LabelSync::new(tracker, issue_id).update(
        &[vocab.planning.as_str(), vocab.priority_label(plan.priority)],
        &[],
    );
    Ok(plan)
}
