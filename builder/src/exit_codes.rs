//! Stable exit codes for builder CLI commands.

/// Command succeeded; for `build`, every requirement was implemented.
pub const OK: i32 = 0;
/// Command failed due to invalid config/input, model or I/O errors.
pub const INVALID: i32 = 1;
/// `builder build` stopped because a requirement ran out of attempts.
pub const BUDGET_EXCEEDED: i32 = 2;
