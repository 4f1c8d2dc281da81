//! Build log output.
//!
//! Build logs are human facing: every line goes to stderr with a fixed
//! prefix, a timestamp and a color that says what kind of line it is.
//! Multi-line messages are split so that every physical line carries the
//! prefix:
//!
//! ```text
//! targetflow | 2026/01/02 15:04:05 first line
//! targetflow | 2026/01/02 15:04:05  |> second line
//! ```
//!
//! Each physical line is a separate `tracing` event with a `kind` field, so
//! the same output can be rendered as JSON with [`LogFormat::Json`].

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Prefix printed before every build log line.
pub const PREFIX: &str = "targetflow | ";

/// Marker printed before continuation lines of a multi-line message.
pub const MULTI_LINE_INDENT: &str = " |> ";

const NO_COLOR: &str = "\u{1b}[0m";

/// What a log line reports. Decides its color and `tracing` level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    /// General progress. Cyan.
    Info,
    /// Low-importance detail. Gray.
    QuietInfo,
    /// Something finished well. Green.
    Success,
    /// Something worth a look. Yellow.
    Warn,
    /// Something failed. Red.
    Error,
    /// Something failed and the process is about to exit. Bold red.
    Fatal,
}

impl LogKind {
    /// Returns the value stored in the `kind` field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::QuietInfo => "quiet",
            Self::Success => "success",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }

    /// Parses a `kind` field value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "info" => Some(Self::Info),
            "quiet" => Some(Self::QuietInfo),
            "success" => Some(Self::Success),
            "warn" => Some(Self::Warn),
            "error" => Some(Self::Error),
            "fatal" => Some(Self::Fatal),
            _ => None,
        }
    }

    /// Returns the ANSI color escape for this kind.
    #[must_use]
    pub const fn color(self) -> &'static str {
        match self {
            Self::Info => "\u{1b}[36m",
            Self::QuietInfo => "\u{1b}[90m",
            Self::Success => "\u{1b}[32m",
            Self::Warn => "\u{1b}[33m",
            Self::Error => "\u{1b}[31m",
            Self::Fatal => "\u{1b}[1m\u{1b}[31m",
        }
    }

    /// Returns the `tracing` level lines of this kind are emitted at.
    #[must_use]
    pub const fn level(self) -> Level {
        match self {
            Self::Info | Self::QuietInfo | Self::Success => Level::INFO,
            Self::Warn => Level::WARN,
            Self::Error | Self::Fatal => Level::ERROR,
        }
    }

    fn from_level(level: Level) -> Self {
        match level {
            Level::ERROR => Self::Error,
            Level::WARN => Self::Warn,
            Level::INFO => Self::Info,
            _ => Self::QuietInfo,
        }
    }
}

/// Splits a message into physical lines, marking continuation lines.
#[must_use]
pub fn format_multiline(message: &str) -> Vec<String> {
    message
        .split('\n')
        .enumerate()
        .map(|(i, line)| {
            if i == 0 {
                line.to_string()
            } else {
                format!("{MULTI_LINE_INDENT}{line}")
            }
        })
        .collect()
}

/// Logs `message` with the given kind, one event per line.
pub fn log(kind: LogKind, message: impl AsRef<str>) {
    for line in format_multiline(message.as_ref()) {
        match kind.level() {
            Level::ERROR => tracing::error!(kind = kind.as_str(), "{line}"),
            Level::WARN => tracing::warn!(kind = kind.as_str(), "{line}"),
            _ => tracing::info!(kind = kind.as_str(), "{line}"),
        }
    }
}

/// Logs general progress.
pub fn info(message: impl AsRef<str>) {
    log(LogKind::Info, message);
}

/// Logs low-importance detail.
pub fn quiet_info(message: impl AsRef<str>) {
    log(LogKind::QuietInfo, message);
}

/// Logs a success.
pub fn success(message: impl AsRef<str>) {
    log(LogKind::Success, message);
}

/// Logs a warning.
pub fn warn(message: impl AsRef<str>) {
    log(LogKind::Warn, message);
}

/// Logs an error.
pub fn error(message: impl AsRef<str>) {
    log(LogKind::Error, message);
}

/// Logs a fatal error and exits the process with [`crate::exit_codes::FATAL`].
///
/// The library itself never calls this; stages return errors and the
/// dispatcher picks the exit code. It is for build programs that must stop
/// during their own setup, before [`crate::dispatch::run_main`] takes over.
pub fn fatal(message: impl AsRef<str>) -> ! {
    log(LogKind::Fatal, message);
    std::process::exit(crate::exit_codes::FATAL)
}

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Prefixed, timestamped and colored lines.
    #[default]
    Build,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Output format.
    pub format: LogFormat,
    /// Whether ANSI colors are written. Off by default when `NO_COLOR` is set.
    pub color: bool,
    /// Level filter used when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Build,
            color: std::env::var_os("NO_COLOR").is_none(),
            level: "info".to_string(),
        }
    }
}

/// Installs the global subscriber for build logs.
///
/// `RUST_LOG` takes precedence over `config.level`. Output goes to stderr so
/// that stdout stays free for piped command output. Returns false if a
/// subscriber was already installed.
pub fn init(config: &LogConfig) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let build_layer = (config.format == LogFormat::Build).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(config.color)
            .event_format(BuildLogFormat::new(config.color))
    });
    let json_layer = (config.format == LogFormat::Json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .json()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(build_layer)
        .with(json_layer)
        .try_init()
        .is_ok()
}

/// Event formatter for the build log format.
#[derive(Debug, Clone, Copy)]
pub struct BuildLogFormat {
    ansi: bool,
}

impl BuildLogFormat {
    /// Creates a formatter, with or without ANSI colors.
    #[must_use]
    pub const fn new(ansi: bool) -> Self {
        Self { ansi }
    }
}

impl<S, N> FormatEvent<S, N> for BuildLogFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut line = LineVisitor::default();
        event.record(&mut line);

        let kind = line
            .kind
            .as_deref()
            .and_then(LogKind::parse)
            .unwrap_or_else(|| LogKind::from_level(*event.metadata().level()));
        let (color, reset) = if self.ansi {
            (kind.color(), NO_COLOR)
        } else {
            ("", "")
        };

        let timestamp = chrono::Local::now().format("%Y/%m/%d %H:%M:%S");
        write!(writer, "{PREFIX}{timestamp} ")?;

        let (indent, text) = match line.message.strip_prefix(MULTI_LINE_INDENT) {
            Some(rest) => (MULTI_LINE_INDENT, rest),
            None => ("", line.message.as_str()),
        };
        writeln!(writer, "{indent}{color}{text}{}{reset}", line.fields)
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    kind: Option<String>,
    fields: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "kind" => self.kind = Some(value.to_string()),
            "message" => self.message = value.to_string(),
            name => self.fields.push_str(&format!(" {name}={value}")),
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{value:?}"),
            "kind" => self.kind = Some(format!("{value:?}")),
            name => self.fields.push_str(&format!(" {name}={value:?}")),
        }
    }
}
