//! Stable exit codes for orchestrator CLI commands.

/// Run completed and every phase succeeded (or a read-only command succeeded).
pub const OK: i32 = 0;
/// A phase failed or the review verdict did not pass.
pub const PIPELINE_FAILED: i32 = 1;
/// The issue could not be fetched; the run was escalated.
pub const ESCALATED: i32 = 2;
/// The execution report could not be persisted.
pub const REPORT_FAILED: i32 = 3;
/// Invalid usage, configuration, or the issue is locked by another run.
pub const INVALID: i32 = 4;
