//! Execution report persistence (`.ai/parallel-reports/report-<issue>-<millis>.json`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::core::types::ExecutionReport;

/// Durable sink for finished runs.
pub trait ReportStore {
    /// Persist `report` and return where it was written.
    fn save(&self, report: &ExecutionReport) -> Result<PathBuf>;
}

/// A persisted report located by its file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub path: PathBuf,
    pub issue_id: u64,
    pub timestamp_ms: i64,
}

/// One pretty-printed JSON file per run, never overwritten.
#[derive(Debug, Clone)]
pub struct FileReportStore {
    dir: PathBuf,
}

impl FileReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reports in the store, optionally for one issue, oldest first per issue.
    pub fn list(&self, issue_id: Option<u64>) -> Result<Vec<ReportEntry>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("read reports dir {}", self.dir.display()))?
        {
            let entry = entry.with_context(|| format!("read entry in {}", self.dir.display()))?;
            let name = entry.file_name();
            let Some((issue, timestamp_ms)) = name.to_str().and_then(parse_report_name) else {
                continue;
            };
            if issue_id.is_some_and(|id| id != issue) {
                continue;
            }
            entries.push(ReportEntry {
                path: entry.path(),
                issue_id: issue,
                timestamp_ms,
            });
        }
        entries.sort_by_key(|e| (e.issue_id, e.timestamp_ms));
        Ok(entries)
    }

    pub fn load(&self, path: &Path) -> Result<ExecutionReport> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read report {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("parse report {}", path.display()))
    }

    fn free_path(&self, issue_id: u64, mut timestamp_ms: i64) -> PathBuf {
        loop {
            let path = self.dir.join(report_file_name(issue_id, timestamp_ms));
            if !path.exists() {
                return path;
            }
            debug!(path = %path.display(), "report name taken, bumping timestamp");
            timestamp_ms += 1;
        }
    }
}

impl ReportStore for FileReportStore {
    fn save(&self, report: &ExecutionReport) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create reports dir {}", self.dir.display()))?;
        let path = self.free_path(report.issue_id, report.end_time.timestamp_millis());
        let mut buf = serde_json::to_string_pretty(report).context("serialize report")?;
        buf.push('\n');
        write_atomic(&path, &buf)?;
        info!(path = %path.display(), success = report.success, "report saved");
        Ok(path)
    }
}

pub fn report_file_name(issue_id: u64, timestamp_ms: i64) -> String {
    format!("report-{issue_id}-{timestamp_ms}.json")
}

fn parse_report_name(name: &str) -> Option<(u64, i64)> {
    let stem = name.strip_prefix("report-")?.strip_suffix(".json")?;
    let (issue, timestamp) = stem.split_once('-')?;
    match (issue.parse::<u64>(), timestamp.parse::<i64>()) {
        (Ok(issue), Ok(timestamp)) => Some((issue, timestamp)),
        _ => {
            warn!(name, "ignoring malformed report file name");
            None
        }
    }
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp report {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("persist report {}", path.display()))?;
    Ok(())
}
