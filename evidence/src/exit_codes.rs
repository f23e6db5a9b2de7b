//! Stable exit codes for the evidence CLI.

/// Command succeeded.
pub const OK: i32 = 0;
/// Unexpected failure (I/O while building, serialization, internal errors).
pub const INTERNAL: i32 = 1;
/// Index could not be loaded or the requested run/artifact was not found.
pub const LOOKUP: i32 = 2;
