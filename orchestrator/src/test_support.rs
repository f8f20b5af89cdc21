//! Test-only fakes for the tracker and agent runner, plus data builders.

use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::core::types::{
    AgentKind, AgentResult, ChangeAction, FileChange, IssueSnapshot, IssueState,
};
use crate::io::agents::AgentRunner;
use crate::io::tracker::{IssueTracker, TrackerError};

/// Open issue with the given labels.
pub fn issue(id: u64, title: &str, body: &str, labels: &[&str]) -> IssueSnapshot {
    IssueSnapshot {
        id,
        title: title.to_string(),
        body: body.to_string(),
        labels: labels.iter().map(|l| l.to_string()).collect(),
        state: IssueState::Open,
    }
}

/// Deterministic result with no output and no changes.
pub fn result(agent: AgentKind, success: bool) -> AgentResult {
    AgentResult {
        agent_name: agent,
        success,
        duration_ms: 1,
        stdout: None,
        stderr: None,
        error: None,
        changes: Vec::new(),
        score: None,
    }
}

/// `result` with `n` created files.
pub fn result_with_changes(agent: AgentKind, success: bool, n: usize) -> AgentResult {
    AgentResult {
        changes: (0..n)
            .map(|i| FileChange {
                path: format!("src/{agent}_{i}.rs"),
                action: ChangeAction::Create,
            })
            .collect(),
        ..result(agent, success)
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    issues: BTreeMap<u64, IssueSnapshot>,
    label_ops: Vec<String>,
    comments: Vec<(u64, String)>,
}

/// In-memory tracker recording every label operation as `+label` / `-label`.
#[derive(Debug, Default)]
pub struct MemoryTracker {
    state: RefCell<TrackerState>,
    fail_fetch: bool,
    fail_labels: bool,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_issue(self, issue: IssueSnapshot) -> Self {
        self.state.borrow_mut().issues.insert(issue.id, issue);
        self
    }

    /// Every fetch fails with a transport error.
    pub fn failing_fetch(mut self) -> Self {
        self.fail_fetch = true;
        self
    }

    /// Every label add/remove fails.
    pub fn failing_labels(mut self) -> Self {
        self.fail_labels = true;
        self
    }

    pub fn label_ops(&self) -> Vec<String> {
        self.state.borrow().label_ops.clone()
    }

    pub fn comments(&self) -> Vec<(u64, String)> {
        self.state.borrow().comments.clone()
    }

    /// Current labels of a stored issue.
    pub fn labels(&self, id: u64) -> Vec<String> {
        self.state
            .borrow()
            .issues
            .get(&id)
            .map(|i| i.labels.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn edit(&self, id: u64, labels: &[String], add: bool) -> Result<(), TrackerError> {
        if self.fail_labels {
            return Err(TrackerError::Transport("label service unavailable".to_string()));
        }
        let mut state = self.state.borrow_mut();
        for label in labels {
            state
                .label_ops
                .push(format!("{}{label}", if add { '+' } else { '-' }));
            if let Some(issue) = state.issues.get_mut(&id) {
                if add {
                    issue.labels.insert(label.clone());
                } else {
                    issue.labels.remove(label);
                }
            }
        }
        Ok(())
    }
}

impl IssueTracker for MemoryTracker {
    fn fetch(&self, id: u64) -> Result<IssueSnapshot, TrackerError> {
        if self.fail_fetch {
            return Err(TrackerError::Transport("tracker unreachable".to_string()));
        }
        self.state
            .borrow()
            .issues
            .get(&id)
            .cloned()
            .ok_or(TrackerError::NotFound(id))
    }

    fn add_labels(&self, id: u64, labels: &[String]) -> Result<(), TrackerError> {
        self.edit(id, labels, true)
    }

    fn remove_labels(&self, id: u64, labels: &[String]) -> Result<(), TrackerError> {
        self.edit(id, labels, false)
    }

    fn comment(&self, id: u64, body: &str) -> Result<(), TrackerError> {
        self.state.borrow_mut().comments.push((id, body.to_string()));
        Ok(())
    }
}

/// Agent runner returning scripted results and logging every call.
#[derive(Debug, Default)]
pub struct ScriptedAgentRunner {
    scripted: BTreeMap<AgentKind, AgentResult>,
    calls: RefCell<Vec<AgentKind>>,
}

impl ScriptedAgentRunner {
    /// Every agent succeeds unless scripted otherwise.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(self, agent: AgentKind) -> Self {
        self.with_result(result(agent, false))
    }

    pub fn with_result(mut self, result: AgentResult) -> Self {
        self.scripted.insert(result.agent_name, result);
        self
    }

    pub fn calls(&self) -> Vec<AgentKind> {
        self.calls.borrow().clone()
    }
}

impl AgentRunner for ScriptedAgentRunner {
    fn run(&self, agent: AgentKind, _issue_id: u64) -> AgentResult {
        self.calls.borrow_mut().push(agent);
        self.scripted
            .get(&agent)
            .cloned()
            .unwrap_or_else(|| result(agent, true))
    }
}
