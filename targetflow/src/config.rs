//! Build configuration resolved from the command line.

use crate::dispatch::Cli;
use crate::logging::LogConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for one build system invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Logging settings.
    pub log: LogConfig,
    /// Upper bound on how long the invoked target may run.
    pub timeout: Option<Duration>,
}

impl BuildConfig {
    /// Returns the configuration as JSON for debug logging.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}

impl From<&Cli> for BuildConfig {
    fn from(cli: &Cli) -> Self {
        let defaults = LogConfig::default();
        Self {
            log: LogConfig {
                format: cli.log_format,
                color: defaults.color && !cli.no_color,
                level: cli.log_level.clone(),
            },
            timeout: cli.timeout.map(Duration::from_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogFormat;
    use clap::Parser;

    #[test]
    fn test_from_cli() {
        let cli = Cli::try_parse_from([
            "bs",
            "--timeout",
            "30",
            "--log-format",
            "json",
            "--no-color",
            "--log-level",
            "debug",
            "test",
        ])
        .expect("parse");

        let config = BuildConfig::from(&cli);
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.log.format, LogFormat::Json);
        assert!(!config.log.color);
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn test_serializes() {
        let config = BuildConfig {
            timeout: Some(Duration::from_secs(5)),
            ..BuildConfig::default()
        };
        let json = config.to_json();
        assert!(json.contains("\"format\":\"build\""));

        let back: BuildConfig = serde_json::from_str(&json).expect("round trip");
        assert_eq!(back, config);
    }
}
