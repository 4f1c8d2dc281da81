//! Command-line entry point for build system binaries.
//!
//! A build system binary registers its targets and hands over to
//! [`run_main`]:
//!
//! ```no_run
//! use targetflow::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> std::process::ExitCode {
//!     run_main("bs", |registry| {
//!         register_cargo_targets(registry, &CargoTargets::all())
//!     })
//!     .await
//! }
//! ```

use crate::config::BuildConfig;
use crate::context::Context;
use crate::errors::ConfigError;
use crate::events::LoggingEventSink;
use crate::exit_codes;
use crate::logging::{self, LogConfig, LogFormat};
use crate::registry::Registry;
use clap::error::ErrorKind;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;

/// Command-line arguments of a build system binary.
///
/// Options must come before the target; everything after the target is
/// handed to its stages.
#[derive(Debug, Clone, Parser)]
#[command(version, about = "Runs a named build target", long_about = None)]
pub struct Cli {
    /// The target to run.
    pub target: Option<String>,

    /// Arguments passed to every stage of the target.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Stop the target after this many seconds.
    #[arg(long, env = "TARGETFLOW_TIMEOUT_SECS", value_name = "SECS")]
    pub timeout: Option<u64>,

    /// How log lines are rendered.
    #[arg(long, value_enum, default_value_t = LogFormat::Build)]
    pub log_format: LogFormat,

    /// Disable colored output.
    #[arg(long)]
    pub no_color: bool,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Logs how to invoke the build system and which targets exist.
pub fn log_usage(prog: &str, registry: &Registry) {
    logging::info("Usage:");
    logging::info(format!(
        "\t{prog} [target | -h | --help] [target specific args...]"
    ));
    logging::info(format!(
        "\tValid targets: [{}]",
        registry.target_names().join(" ")
    ));
}

/// Runs `target` from `registry` and returns the process exit code.
///
/// Ctrl-C cancels the running target.
pub async fn dispatch(
    prog: &str,
    registry: &Registry,
    config: &BuildConfig,
    target: Option<&str>,
    args: &[String],
) -> i32 {
    let Some(target) = target else {
        logging::error("Expected target to be provided.");
        log_usage(prog, registry);
        logging::quiet_info("Consider: Re-running with a target");
        return exit_codes::FATAL;
    };
    if !registry.contains(target) {
        logging::error("An invalid target was provided");
        log_usage(prog, registry);
        logging::quiet_info("Consider: Re-running with a valid target");
        return exit_codes::FATAL;
    }

    let root = Context::background().with_event_sink(Arc::new(LoggingEventSink::new()));
    let ctx = match config.timeout {
        Some(timeout) => root.with_timeout(timeout),
        None => root,
    };

    let interrupt = {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                logging::warn("Interrupt received, cancelling the running target");
                ctx.cancel("interrupted");
            }
        })
    };
    let result = registry.run_target(&ctx, target, args).await;
    interrupt.abort();

    match result {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            if !err.is_reported() {
                logging::error(err.to_string());
            }
            logging::error("An error was encountered, exiting.");
            exit_codes::FATAL
        }
    }
}

/// Parses the process arguments, sets up logging, registers targets with
/// `register` and runs the requested target.
///
/// Help exits with [`exit_codes::FATAL`] because no target ran.
pub async fn run_main<F>(prog: &str, register: F) -> ExitCode
where
    F: FnOnce(&Registry) -> Result<(), ConfigError>,
{
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => return to_exit_code(handle_parse_error(prog, register, &err)),
    };

    let config = BuildConfig::from(&cli);
    logging::init(&config.log);
    tracing::debug!(config = %config.to_json(), "resolved build configuration");

    let registry = Registry::new();
    if let Err(err) = register(&registry) {
        logging::error(err.to_string());
        return to_exit_code(exit_codes::FATAL);
    }

    to_exit_code(dispatch(prog, &registry, &config, cli.target.as_deref(), &cli.args).await)
}

fn handle_parse_error<F>(prog: &str, register: F, err: &clap::Error) -> i32
where
    F: FnOnce(&Registry) -> Result<(), ConfigError>,
{
    match err.kind() {
        ErrorKind::DisplayVersion => {
            err.print().ok();
            exit_codes::OK
        }
        ErrorKind::DisplayHelp => {
            err.print().ok();
            logging::init(&LogConfig::default());
            let registry = Registry::new();
            if let Err(err) = register(&registry) {
                logging::error(err.to_string());
            }
            log_usage(prog, &registry);
            logging::quiet_info("Consider: Re-running with a target");
            exit_codes::FATAL
        }
        _ => {
            err.print().ok();
            exit_codes::FATAL
        }
    }
}

fn to_exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
