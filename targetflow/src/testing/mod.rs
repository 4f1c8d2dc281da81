//! Testing utilities for targets and stages.
//!
//! This module provides:
//! - A scripted [`CommandRunner`](crate::run::CommandRunner) that never
//!   launches a process
//! - Stages that record, fail or hang on demand
//! - A log capture that renders build log lines into memory

mod capture;
mod mocks;

pub use capture::LogCapture;
pub use mocks::{
    cwd_lock, failing_stage, hanging_stage, recording_stage, ScriptedOutcome, ScriptedRunner,
};
