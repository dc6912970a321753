//! Stable exit codes for `sandbox-engine` CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid config or catalog, a store failure, or an unavailable environment.
pub const INVALID: i32 = 1;
/// `check` rejected the command.
pub const REJECTED: i32 = 2;
/// Unknown learner or track.
pub const NOT_FOUND: i32 = 3;
