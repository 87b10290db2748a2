//! Stable exit codes for persona-sim CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid request, config or input file, or any other error.
pub const INVALID: i32 = 1;
/// `persona-sim show` was given a run id the store does not know.
pub const NOT_FOUND: i32 = 2;
/// `persona-sim run` started the run but it did not complete.
pub const RUN_FAILED: i32 = 3;
