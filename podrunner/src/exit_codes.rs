//! Stable exit codes for podrunner CLI commands.

/// Observed counters matched the expected counters (or `validate` succeeded).
pub const OK: i32 = 0;
/// The run completed but the expectations were not met.
pub const EXPECTATIONS_NOT_MET: i32 = 1;
/// Invalid test definition, configuration or usage.
pub const INVALID: i32 = 2;
/// The node pool could not be counted, scaled or listed.
pub const PROVISIONING: i32 = 3;
/// Any other runtime error.
pub const RUNTIME: i32 = 4;
