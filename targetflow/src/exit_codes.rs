//! Stable exit codes for build system binaries.

/// The target ran to completion.
pub const OK: i32 = 0;
/// No target, an unknown target, a registration mistake, a failed target,
/// or help was requested.
pub const FATAL: i32 = 1;
