//! Pipeline executor: runs a plan's agents in order, fail-fast.
//!
//! Each phase is entered through the state machine in [`crate::core::state`];
//! the resulting label delta is applied best-effort before the agent runs. The
//! first failing agent moves the pipeline to `failed` and no later phase runs.

use tracing::{error, info, instrument, warn};

use crate::core::state::{PhaseEvent, PipelineState, StateLabels, label_delta, transition};
use crate::core::types::{AgentResult, TaskPlan};
use crate::io::agents::AgentRunner;
use crate::io::labels::LabelSync;
use crate::io::tracker::IssueTracker;

/// Results of the attempted phases, in execution order.
///
/// The sequence is complete when every planned agent succeeded, and otherwise
/// ends with the first failed result.
#[instrument(skip_all, fields(issue = issue_id, phases = plan.agent_sequence.len()))]
pub fn execute_pipeline<R, T, L>(
    issue_id: u64,
    plan: &TaskPlan,
    runner: &R,
    labels: &LabelSync<'_, T>,
    vocabulary: &L,
) -> Vec<AgentResult>
where
    R: AgentRunner + ?Sized,
    T: IssueTracker + ?Sized,
    L: StateLabels + ?Sized,
{
    let mut state = PipelineState::Pending;
    let mut results = Vec::with_capacity(plan.agent_sequence.len());

    for &agent in &plan.agent_sequence {
        state = advance(state, PhaseEvent::Enter(agent), labels, vocabulary);
        info!(%agent, %state, "phase started");

        let result = runner.run(agent, issue_id);
        let failed = !result.success;
        results.push(result);

        if failed {
            state = advance(state, PhaseEvent::Fail, labels, vocabulary);
            warn!(%agent, %state, "phase failed, skipping remaining phases");
            return results;
        }
    }

    state = advance(state, PhaseEvent::Complete, labels, vocabulary);
    info!(%state, "pipeline finished");
    results
}

/// Apply `event`, syncing labels on success. An invalid event leaves the
/// state unchanged.
fn advance<T, L>(
    state: PipelineState,
    event: PhaseEvent,
    labels: &LabelSync<'_, T>,
    vocabulary: &L,
) -> PipelineState
where
    T: IssueTracker + ?Sized,
    L: StateLabels + ?Sized,
{
    match transition(state, event) {
        Ok(next) => {
            labels.apply(&label_delta(vocabulary, state, next));
            next
        }
        Err(err) => {
            error!(err = %err, "ignoring invalid phase transition");
            state
        }
    }
}
