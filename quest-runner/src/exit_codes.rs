//! Stable exit codes for quest-runner CLI commands.

/// Command succeeded, or every selected credential reached the goal.
pub const OK: i32 = 0;
/// Startup failed: invalid config, missing or malformed input files, or an
/// unknown wallet selection.
pub const INVALID: i32 = 1;
