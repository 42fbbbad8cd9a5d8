//! Stable exit codes for tddloop CLI commands.

/// The tests passed.
pub const OK: i32 = 0;
/// Invalid input, config or an unexpected error.
pub const INVALID: i32 = 1;
/// `tddloop run` exhausted its attempts, or `tddloop exec` saw failing tests.
pub const FAILED: i32 = 2;
/// `tddloop run` stopped because the oracle could not be reached.
pub const ORACLE_ERROR: i32 = 3;
