//! # Targetflow
//!
//! A small build automation engine for writing a repository's build system
//! in Rust.
//!
//! A build system is a set of named **targets**. Each target is an ordered
//! list of **stages**, and each stage is one logged, timed, cancellable unit
//! of work. Running a target runs its stages in order and stops at the first
//! failure.
//!
//! - **Stages**: async operations wrapped with start and finish logging,
//!   timing, lifecycle events and a cancellation/deadline boundary
//! - **Registry**: an explicit name to target map, run by name
//! - **Composition**: run another target as a stage, cd to the repository
//!   root, fail on uncommitted changes
//! - **Standard targets**: formatting, linting, tests, dependency updates and
//!   a pre-merge gate for cargo repositories
//! - **Dispatcher**: a `clap` command line that maps arguments to a target
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use targetflow::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> std::process::ExitCode {
//!     run_main("bs", |registry| {
//!         register_cargo_targets(registry, &CargoTargets::all())?;
//!         register_mergegate_target(
//!             registry,
//!             &MergegateTargets {
//!                 fmt_target: Some("fmt".to_string()),
//!                 test_target: Some("test".to_string()),
//!                 ..MergegateTargets::default()
//!             },
//!         )
//!     })
//!     .await
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod errors;
pub mod events;
pub mod exit_codes;
pub mod logging;
pub mod registry;
pub mod run;
pub mod stages;
pub mod targets;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::BuildConfig;
    pub use crate::context::Context;
    pub use crate::dispatch::{dispatch, run_main, Cli};
    pub use crate::errors::{BuildError, ConfigError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::logging::{LogConfig, LogFormat};
    pub use crate::registry::{Registry, RunState, Target};
    pub use crate::run::{
        git_rev_parse, run, run_cwd, run_cwd_stdout, run_stdout, CommandRunner, Invocation,
        ProcessRunner,
    };
    pub use crate::stages::builtin::{
        cd_to_repo_path, cd_to_repo_root, git_diff_stage, target_as_stage,
    };
    pub use crate::stages::{stage, Stage, StageResult};
    pub use crate::targets::{
        register_bs_build_target, register_cargo_targets, register_mergegate_target,
        register_readme_targets, register_update_deps_target, CargoTargets, CommandTarget,
        MergegateTargets, UpdateDeps,
    };
    pub use crate::utils::{iso_timestamp, tmp_env_var_set, EnvVarGuard};
}
