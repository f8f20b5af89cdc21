//! Agent pipeline orchestrator.
//!
//! A run takes one tracked issue, classifies it into a [`core::types::TaskPlan`],
//! executes the planned agents in order with fail-fast semantics, and persists
//! an execution report. The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (classification, the phase state
//!   machine, review scoring). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting adapters (child processes, the `gh` tracker,
//!   report files, locks). Behind traits so tests can substitute fakes.
//!
//! Orchestration modules ([`pipeline`], [`review_agent`], [`run`], [`cli`])
//! coordinate core logic with I/O to implement CLI commands.

pub mod cli;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod review_agent;
pub mod run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
