//! Stable exit codes for the orchestrator CLI.

/// Run finished, or the task pack validated cleanly.
pub const OK: i32 = 0;
/// Any fatal failure: configuration, phase exhaustion, acceptance, contract
/// violations, publishing, or task pack validation issues.
pub const FAILURE: i32 = 1;
