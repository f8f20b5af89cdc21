//! CLI command implementations. Each returns the process exit code.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, error, info};

use crate::core::types::AgentKind;
use crate::exit_codes;
use crate::io::agents::{Agent, AgentRegistry, SubprocessAgent};
use crate::io::config::{OrchestratorConfig, PathsConfig};
use crate::io::report_store::FileReportStore;
use crate::io::tracker::GhTracker;
use crate::review_agent::ReviewAgent;
use crate::run::{RunDeps, RunError, plan_issue, run_issue};

/// Everything a command needs, resolved against the workspace root.
pub struct Workspace<'a> {
    pub root: &'a Path,
    pub config: &'a OrchestratorConfig,
    pub paths: &'a PathsConfig,
}

impl Workspace<'_> {
    fn tracker(&self) -> GhTracker {
        GhTracker::new(&self.config.tracker, self.root)
    }
}

/// Run the full pipeline for one issue.
pub fn run_pipeline(ws: &Workspace<'_>, issue_id: u64, concurrency: usize) -> Result<i32> {
    // Phases run sequentially; the hint is only logged.
    info!(issue = issue_id, concurrency, "starting run");
    let tracker = ws.tracker();

    let mut registry = AgentRegistry::new();
    for kind in AgentKind::ALL {
        if kind == AgentKind::Review && ws.config.agents.builtin_review {
            registry.register(
                kind,
                ReviewAgent::from_config(&tracker, &ws.config.review, ws.root)?,
            );
        } else {
            registry.register(
                kind,
                SubprocessAgent::new(kind, &ws.config.agents, ws.root, &ws.paths.outputs_dir),
            );
        }
    }

    let store = FileReportStore::new(&ws.paths.reports_dir);
    let deps = RunDeps {
        tracker: &tracker,
        runner: &registry,
        store: &store,
        labels: &ws.config.labels,
        locks_dir: &ws.paths.locks_dir,
    };

    match run_issue(issue_id, &deps) {
        Ok(outcome) => {
            println!(
                "run: issue={} success={} phases={} changes={} report={}",
                issue_id,
                outcome.report.success,
                outcome.report.results.len(),
                outcome.report.total_changes,
                outcome.report_path.display()
            );
            Ok(if outcome.report.success {
                exit_codes::OK
            } else {
                exit_codes::PIPELINE_FAILED
            })
        }
        Err(err) => {
            error!(err = %err, "run aborted");
            eprintln!("{err}");
            Ok(match err {
                RunError::Fetch(_) => exit_codes::ESCALATED,
                RunError::Locked(_) => exit_codes::INVALID,
                RunError::ReportPersist { .. } => exit_codes::REPORT_FAILED,
            })
        }
    }
}

/// Classify an issue and print the plan as JSON.
pub fn plan(ws: &Workspace<'_>, issue_id: u64) -> Result<i32> {
    let tracker = ws.tracker();
    let plan = plan_issue(issue_id, &tracker, &ws.config.labels)
        .with_context(|| format!("plan issue #{issue_id}"))?;
    let json = serde_json::to_string_pretty(&plan).context("serialize plan")?;
    println!("{json}");
    Ok(exit_codes::OK)
}

/// Run the review checks once and post the report.
pub fn review(ws: &Workspace<'_>, issue_id: u64) -> Result<i32> {
    let tracker = ws.tracker();
    let agent = ReviewAgent::from_config(&tracker, &ws.config.review, ws.root)?;
    let result = agent.invoke(issue_id);
    if let Some(summary) = &result.stdout {
        println!("{summary}");
    }
    println!(
        "review: issue={} score={} passed={}",
        issue_id,
        result.score.unwrap_or_default(),
        result.success
    );
    Ok(if result.success {
        exit_codes::OK
    } else {
        exit_codes::PIPELINE_FAILED
    })
}

/// List persisted execution reports.
pub fn reports(ws: &Workspace<'_>, issue_id: Option<u64>) -> Result<i32> {
    let store = FileReportStore::new(&ws.paths.reports_dir);
    let entries = store.list(issue_id)?;
    debug!(count = entries.len(), dir = %store.dir().display(), "reports listed");
    for entry in entries {
        match store.load(&entry.path) {
            Ok(report) => println!(
                "report: issue={} started={} success={} phases={} changes={} path={}",
                report.issue_id,
                report.start_time.to_rfc3339(),
                report.success,
                report.results.len(),
                report.total_changes,
                entry.path.display()
            ),
            Err(err) => eprintln!("warning: {err:#}"),
        }
    }
    Ok(exit_codes::OK)
}
