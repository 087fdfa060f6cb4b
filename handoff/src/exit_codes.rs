//! Stable exit codes for handoff CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid arguments or config, unknown tool, or a failed delegation.
pub const FAILED: i32 = 1;
/// The session stopped early; `handoff resume <id>` can pick it up.
pub const NEEDS_CONTINUE: i32 = 2;
