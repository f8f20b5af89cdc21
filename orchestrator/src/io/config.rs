//! Orchestrator configuration stored at `.ai/orchestrator.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::review::{DEFAULT_PASS_THRESHOLD, SECURITY_CATEGORY};
use crate::core::state::{PipelineState, StateLabels};
use crate::core::types::{AgentKind, Priority};

pub const DEFAULT_CONFIG_PATH: &str = ".ai/orchestrator.toml";

/// Orchestrator configuration (TOML).
///
/// Missing fields default to the values the pipeline was designed around.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub paths: PathsConfig,
    pub agents: AgentsConfig,
    pub labels: LabelConfig,
    pub review: ReviewConfig,
    pub tracker: TrackerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub reports_dir: PathBuf,
    pub logs_dir: PathBuf,
    /// Agents write their output manifests under `<outputs_dir>/<issue>/`.
    pub outputs_dir: PathBuf,
    pub locks_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            reports_dir: PathBuf::from(".ai/parallel-reports"),
            logs_dir: PathBuf::from(".ai/logs"),
            outputs_dir: PathBuf::from(".ai/agent-output"),
            locks_dir: PathBuf::from(".ai/locks"),
        }
    }
}

impl PathsConfig {
    /// Resolve relative paths against `root`.
    pub fn resolve(&self, root: &Path) -> PathsConfig {
        PathsConfig {
            reports_dir: root.join(&self.reports_dir),
            logs_dir: root.join(&self.logs_dir),
            outputs_dir: root.join(&self.outputs_dir),
            locks_dir: root.join(&self.locks_dir),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentsConfig {
    /// argv template; `{agent}`, `{issue}` and `{output}` are substituted.
    pub command: Vec<String>,
    /// Per-agent argv templates, keyed by agent name (`issue`, `codegen`, `review`).
    pub overrides: BTreeMap<String, Vec<String>>,
    /// Run the review phase in-process instead of as a subprocess.
    pub builtin_review: bool,
    /// Kill an agent after this many seconds. Unset waits indefinitely.
    pub timeout_secs: Option<u64>,
    /// Keep at most this many bytes of each of stdout/stderr.
    pub output_limit_bytes: usize,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            command: ["miyabi", "agent", "run", "{agent}", "--issue", "{issue}"]
                .into_iter()
                .map(String::from)
                .collect(),
            overrides: BTreeMap::new(),
            builtin_review: true,
            timeout_secs: None,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl AgentsConfig {
    /// argv template for `agent`, honoring per-agent overrides.
    pub fn command_for(&self, agent: AgentKind) -> &[String] {
        self.overrides
            .get(agent.as_str())
            .unwrap_or(&self.command)
            .as_slice()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LabelConfig {
    pub pending: String,
    pub planning: String,
    pub implementing: String,
    pub reviewing: String,
    pub completed: String,
    pub failed: String,
    /// Trigger label removed when a run starts.
    pub execute: String,
    pub running: String,
    pub run_completed: String,
    pub run_failed: String,
    pub escalated: String,
    pub priority_high: String,
    pub priority_medium: String,
    pub priority_low: String,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            pending: "📥 state:pending".to_string(),
            planning: "🎯 phase:planning".to_string(),
            implementing: "🏗️ state:implementing".to_string(),
            reviewing: "👀 state:reviewing".to_string(),
            completed: "✅ state:completed".to_string(),
            failed: "❌ state:failed".to_string(),
            execute: "🤖agent-execute".to_string(),
            running: "🔄 agent-running".to_string(),
            run_completed: "✅ agent-completed".to_string(),
            run_failed: "❌ agent-failed".to_string(),
            escalated: "🚨escalated".to_string(),
            priority_high: "⚠️ priority:P1-High".to_string(),
            priority_medium: "🟡 priority:P2-Medium".to_string(),
            priority_low: "🟢 priority:P3-Low".to_string(),
        }
    }
}

impl LabelConfig {
    pub fn priority_label(&self, priority: Priority) -> &str {
        match priority {
            Priority::High => &self.priority_high,
            Priority::Medium => &self.priority_medium,
            Priority::Low => &self.priority_low,
        }
    }

    fn all(&self) -> [(&'static str, &str); 14] {
        [
            ("pending", self.pending.as_str()),
            ("planning", self.planning.as_str()),
            ("implementing", self.implementing.as_str()),
            ("reviewing", self.reviewing.as_str()),
            ("completed", self.completed.as_str()),
            ("failed", self.failed.as_str()),
            ("execute", self.execute.as_str()),
            ("running", self.running.as_str()),
            ("run_completed", self.run_completed.as_str()),
            ("run_failed", self.run_failed.as_str()),
            ("escalated", self.escalated.as_str()),
            ("priority_high", self.priority_high.as_str()),
            ("priority_medium", self.priority_medium.as_str()),
            ("priority_low", self.priority_low.as_str()),
        ]
    }
}

impl StateLabels for LabelConfig {
    fn label_for(&self, state: PipelineState) -> &str {
        match state {
            PipelineState::Pending => &self.pending,
            PipelineState::Planning => &self.planning,
            PipelineState::Implementing => &self.implementing,
            PipelineState::Reviewing => &self.reviewing,
            PipelineState::Completed => &self.completed,
            PipelineState::Failed => &self.failed,
        }
    }
}

/// How a command check turns a failing run into a score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Scoring {
    /// `100 - 10 * errors`.
    TypeErrors,
    /// `100 - 15 * errors - 5 * warnings`; passes when there are no errors.
    Lint,
    /// `100 - 20 * failed`, failed count parsed from `N failed`.
    FailedTests,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckConfig {
    pub category: String,
    pub command: Vec<String>,
    pub scoring: Scoring,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SecurityScanConfig {
    /// Directories scanned recursively, relative to the workspace root.
    pub roots: Vec<PathBuf>,
    /// File extensions (without dot) considered source files.
    pub extensions: Vec<String>,
    /// Regex patterns counted as potential vulnerabilities (one hit per line).
    pub patterns: Vec<String>,
    /// Score deducted per hit.
    pub penalty: u32,
}

impl Default for SecurityScanConfig {
    fn default() -> Self {
        Self {
            roots: vec![PathBuf::from("src")],
            extensions: vec!["rs".to_string()],
            patterns: [
                r"unsafe\s*\{",
                r"mem::transmute",
                r"Command::new\(\s*&?format!",
                r#"\.arg\(\s*"-c"\s*\)"#,
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            penalty: 25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReviewConfig {
    pub pass_threshold: u32,
    pub check_timeout_secs: u64,
    pub output_limit_bytes: usize,
    /// Post the rendered review to the issue.
    pub post_comment: bool,
    pub checks: Vec<CheckConfig>,
    pub security: SecurityScanConfig,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        let check = |category: &str, command: &[&str], scoring| CheckConfig {
            category: category.to_string(),
            command: command.iter().map(|s| s.to_string()).collect(),
            scoring,
        };
        Self {
            pass_threshold: DEFAULT_PASS_THRESHOLD,
            check_timeout_secs: 10 * 60,
            output_limit_bytes: 1_000_000,
            post_comment: true,
            checks: vec![
                check(
                    "TypeCheck",
                    &["cargo", "check", "--all-targets"],
                    Scoring::TypeErrors,
                ),
                check(
                    "Lint",
                    &["cargo", "clippy", "--all-targets", "--", "-D", "warnings"],
                    Scoring::Lint,
                ),
                check("Tests", &["cargo", "test"], Scoring::FailedTests),
            ],
            security: SecurityScanConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TrackerConfig {
    /// Issue tracker CLI (`gh`).
    pub program: String,
    /// `owner/name`; unset uses the repository of the working directory.
    pub repo: Option<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            program: "gh".to_string(),
            repo: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.agents.command.is_empty() || self.agents.command[0].trim().is_empty() {
            return Err(anyhow!("agents.command must be a non-empty array"));
        }
        for (name, argv) in &self.agents.overrides {
            name.parse::<AgentKind>()
                .with_context(|| format!("agents.overrides.{name}"))?;
            if argv.is_empty() || argv[0].trim().is_empty() {
                return Err(anyhow!("agents.overrides.{name} must be a non-empty array"));
            }
        }
        if self.agents.timeout_secs == Some(0) {
            return Err(anyhow!("agents.timeout_secs must be > 0 when set"));
        }
        if self.agents.output_limit_bytes == 0 {
            return Err(anyhow!("agents.output_limit_bytes must be > 0"));
        }
        for (key, label) in self.labels.all() {
            if label.trim().is_empty() {
                return Err(anyhow!("labels.{key} must not be empty"));
            }
        }
        if self.review.pass_threshold > 100 {
            return Err(anyhow!("review.pass_threshold must be <= 100"));
        }
        if self.review.check_timeout_secs == 0 {
            return Err(anyhow!("review.check_timeout_secs must be > 0"));
        }
        if self.review.output_limit_bytes == 0 {
            return Err(anyhow!("review.output_limit_bytes must be > 0"));
        }
        for check in &self.review.checks {
            if check.command.is_empty() || check.command[0].trim().is_empty() {
                return Err(anyhow!(
                    "review check '{}' must have a non-empty command",
                    check.category
                ));
            }
            if check.category == SECURITY_CATEGORY {
                return Err(anyhow!(
                    "review check category '{SECURITY_CATEGORY}' is reserved for the security scan"
                ));
            }
        }
        for pattern in &self.review.security.patterns {
            regex::Regex::new(pattern)
                .with_context(|| format!("review.security.patterns: invalid regex '{pattern}'"))?;
        }
        if self.tracker.program.trim().is_empty() {
            return Err(anyhow!("tracker.program must not be empty"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `OrchestratorConfig::default()`.
pub fn load_config(path: &Path) -> Result<OrchestratorConfig> {
    if !path.exists() {
        let cfg = OrchestratorConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: OrchestratorConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &OrchestratorConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
