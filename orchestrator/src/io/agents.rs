//! Agent invocation.
//!
//! The [`AgentRunner`] trait decouples the pipeline from how a phase's agent
//! is executed. [`AgentRegistry`] is the production runner: it maps each
//! [`AgentKind`] to an [`Agent`] callable, either a [`SubprocessAgent`] or an
//! in-process agent such as the review phase. Tests use scripted runners that
//! never spawn processes.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, error, info, instrument, warn};

use crate::core::types::{AgentKind, AgentResult, FileChange};
use crate::io::config::AgentsConfig;
use crate::io::process::run_command;

/// Runs the agent bound to a phase. Never fails: launch errors are results.
pub trait AgentRunner {
    fn run(&self, agent: AgentKind, issue_id: u64) -> AgentResult;
}

/// A single invokable agent.
pub trait Agent {
    fn invoke(&self, issue_id: u64) -> AgentResult;
}

impl<A: Agent + ?Sized> Agent for &A {
    fn invoke(&self, issue_id: u64) -> AgentResult {
        (**self).invoke(issue_id)
    }
}

/// Closed mapping from agent kind to its callable.
#[derive(Default)]
pub struct AgentRegistry<'a> {
    agents: BTreeMap<AgentKind, Box<dyn Agent + 'a>>,
}

impl<'a> AgentRegistry<'a> {
    pub fn new() -> Self {
        Self {
            agents: BTreeMap::new(),
        }
    }

    /// Register `agent` for `kind`, replacing any previous registration.
    pub fn register(&mut self, kind: AgentKind, agent: impl Agent + 'a) -> &mut Self {
        self.agents.insert(kind, Box::new(agent));
        self
    }
}

impl AgentRunner for AgentRegistry<'_> {
    #[instrument(skip(self))]
    fn run(&self, agent: AgentKind, issue_id: u64) -> AgentResult {
        info!(%agent, issue = issue_id, "starting agent");
        let result = match self.agents.get(&agent) {
            Some(callable) => callable.invoke(issue_id),
            None => {
                error!(%agent, "no agent registered");
                AgentResult::launch_failure(agent, 0, format!("no agent registered for '{agent}'"))
            }
        };
        if result.success {
            info!(%agent, duration_ms = result.duration_ms, "agent completed");
        } else {
            error!(%agent, duration_ms = result.duration_ms, error = ?result.error, "agent failed");
        }
        result
    }
}

/// Agent executed as an external process built from an argv template.
#[derive(Debug, Clone)]
pub struct SubprocessAgent {
    kind: AgentKind,
    argv: Vec<String>,
    workdir: PathBuf,
    outputs_dir: PathBuf,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
}

/// Optional JSON an agent writes to its `{output}` path.
#[derive(Debug, Default, Deserialize)]
struct AgentManifest {
    #[serde(default)]
    changes: Vec<FileChange>,
}

impl SubprocessAgent {
    pub fn new(kind: AgentKind, config: &AgentsConfig, workdir: &Path, outputs_dir: &Path) -> Self {
        Self {
            kind,
            argv: config.command_for(kind).to_vec(),
            workdir: workdir.to_path_buf(),
            outputs_dir: outputs_dir.to_path_buf(),
            timeout: config.timeout_secs.map(Duration::from_secs),
            output_limit_bytes: config.output_limit_bytes,
        }
    }

    /// Where this agent may write its manifest for `issue_id`.
    pub fn output_path(&self, issue_id: u64) -> PathBuf {
        self.outputs_dir
            .join(issue_id.to_string())
            .join(format!("{}.json", self.kind))
    }

    fn command(&self, issue_id: u64, output_path: &Path) -> Command {
        let output = output_path.display().to_string();
        let issue = issue_id.to_string();
        let mut argv = self.argv.iter().map(|arg| {
            arg.replace("{agent}", self.kind.as_str())
                .replace("{issue}", &issue)
                .replace("{output}", &output)
        });
        let program = argv.next().unwrap_or_default();
        let mut cmd = Command::new(program);
        cmd.args(argv).current_dir(&self.workdir);
        cmd
    }

    fn prepare_output(&self, output_path: &Path) -> Result<()> {
        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create output dir {}", parent.display()))?;
        }
        if output_path.exists() {
            fs::remove_file(output_path)
                .with_context(|| format!("remove stale output {}", output_path.display()))?;
        }
        Ok(())
    }
}

impl Agent for SubprocessAgent {
    #[instrument(skip(self), fields(agent = %self.kind))]
    fn invoke(&self, issue_id: u64) -> AgentResult {
        let start = Instant::now();
        let output_path = self.output_path(issue_id);
        if let Err(err) = self.prepare_output(&output_path) {
            warn!(err = %err, "could not prepare agent output path");
        }

        let output = match run_command(
            self.command(issue_id, &output_path),
            self.timeout,
            self.output_limit_bytes,
        ) {
            Ok(output) => output,
            Err(err) => {
                return AgentResult::launch_failure(
                    self.kind,
                    elapsed_ms(start),
                    format!("{err:#}"),
                );
            }
        };

        let error = if output.timed_out {
            let secs = self.timeout.map(|t| t.as_secs()).unwrap_or_default();
            Some(format!("timed out after {secs}s"))
        } else {
            None
        };
        debug!(exit_code = ?output.status.code(), "agent exited");

        AgentResult {
            agent_name: self.kind,
            success: output.success(),
            duration_ms: elapsed_ms(start),
            stdout: non_empty(output.stdout_text()),
            stderr: non_empty(output.stderr_text()),
            error,
            changes: read_changes(&output_path),
            score: None,
        }
    }
}

pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

/// Changes listed in the agent manifest; a missing manifest means none.
fn read_changes(path: &Path) -> Vec<FileChange> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(_) => return Vec::new(),
    };
    match serde_json::from_str::<AgentManifest>(&contents) {
        Ok(manifest) => manifest.changes,
        Err(err) => {
            warn!(path = %path.display(), err = %err, "ignoring unparsable agent manifest");
            Vec::new()
        }
    }
}
