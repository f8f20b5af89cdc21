//! Explicit phase state machine for a pipeline run.
//!
//! The tracker labels mirror this state, but the pipeline never reads labels
//! back: transitions are computed here and the label adapter only applies the
//! resulting [`LabelDelta`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::types::AgentKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Pending,
    Planning,
    Implementing,
    Reviewing,
    Completed,
    Failed,
}

impl PipelineState {
    /// In-progress state entered before running `agent`.
    pub fn for_phase(agent: AgentKind) -> Self {
        match agent {
            AgentKind::Intake => PipelineState::Planning,
            AgentKind::Codegen => PipelineState::Implementing,
            AgentKind::Review => PipelineState::Reviewing,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Completed | PipelineState::Failed)
    }

    fn is_in_progress(self) -> bool {
        matches!(
            self,
            PipelineState::Planning | PipelineState::Implementing | PipelineState::Reviewing
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PipelineState::Pending => "pending",
            PipelineState::Planning => "planning",
            PipelineState::Implementing => "implementing",
            PipelineState::Reviewing => "reviewing",
            PipelineState::Completed => "completed",
            PipelineState::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseEvent {
    /// About to invoke the agent for this phase.
    Enter(AgentKind),
    /// The current phase's agent failed; remaining phases are skipped.
    Fail,
    /// The last planned agent succeeded.
    Complete,
}

impl fmt::Display for PhaseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseEvent::Enter(agent) => write!(f, "enter({agent})"),
            PhaseEvent::Fail => f.write_str("fail"),
            PhaseEvent::Complete => f.write_str("complete"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("invalid transition: cannot apply {event} in state {state}")]
    Invalid {
        state: PipelineState,
        event: PhaseEvent,
    },
}

/// Transition table.
///
/// Phases only move forward; a plan may skip a phase but never revisit one.
/// Terminal states accept no events.
pub fn transition(
    state: PipelineState,
    event: PhaseEvent,
) -> Result<PipelineState, TransitionError> {
    let next = match (state, event) {
        (s, _) if s.is_terminal() => None,
        (s, PhaseEvent::Enter(agent)) => {
            let target = PipelineState::for_phase(agent);
            (target > s).then_some(target)
        }
        (s, PhaseEvent::Complete) if s.is_in_progress() => Some(PipelineState::Completed),
        (_, PhaseEvent::Complete) => None,
        (_, PhaseEvent::Fail) => Some(PipelineState::Failed),
    };
    next.ok_or(TransitionError::Invalid { state, event })
}

/// Labels to add and remove on the work item for one transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelDelta {
    pub add: Vec<String>,
    pub remove: Vec<String>,
}

impl LabelDelta {
    pub fn new(add: Vec<String>, remove: Vec<String>) -> Self {
        Self { add, remove }
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Source of the label string for each state.
pub trait StateLabels {
    fn label_for(&self, state: PipelineState) -> &str;
}

/// Delta for moving `from` -> `to`: add the new state label, drop the old one.
pub fn label_delta<L: StateLabels + ?Sized>(
    labels: &L,
    from: PipelineState,
    to: PipelineState,
) -> LabelDelta {
    if from == to {
        return LabelDelta::default();
    }
    LabelDelta::new(
        vec![labels.label_for(to).to_string()],
        vec![labels.label_for(from).to_string()],
    )
}
