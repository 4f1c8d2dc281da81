//! Error types for targetflow.
//!
//! Errors fall into two families. *Reported* errors ([`BuildError::AlreadyReported`]
//! and [`BuildError::TargetFailed`]) mean the details were already printed and the
//! caller should only unwind. Every other variant still carries diagnostic text
//! that the stage engine logs at the stage boundary.

use thiserror::Error;

/// The main error type for stages, targets and the process runner.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A failure occurred and has already been reported to the user.
    #[error("Generic stop error. See log above for error details.")]
    AlreadyReported,

    /// A target stopped because one of its stages failed.
    #[error("target '{target}' failed at stage '{stage}'")]
    TargetFailed {
        /// The target that stopped.
        target: String,
        /// The stage that failed.
        stage: String,
        /// What the stage returned.
        #[source]
        source: Box<BuildError>,
    },

    /// The context was cancelled.
    #[error("context cancelled: {0}")]
    Cancelled(String),

    /// The context deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// The registry was used incorrectly.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A program could not be started.
    #[error("failed to launch '{program}': {source}")]
    Launch {
        /// The program that was being started.
        program: String,
        /// The underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A plain failure message.
    #[error("{0}")]
    Message(String),

    /// Any other error raised by a stage operation.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BuildError {
    /// Creates a plain message error.
    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Returns true if the details of this error were already logged.
    #[must_use]
    pub fn is_reported(&self) -> bool {
        matches!(self, Self::AlreadyReported | Self::TargetFailed { .. })
    }

    /// Returns true if this error came from the context rather than the work.
    #[must_use]
    pub fn is_context(&self) -> bool {
        matches!(self, Self::Cancelled(_) | Self::DeadlineExceeded)
    }

    /// Returns the configuration error if this is one.
    #[must_use]
    pub fn as_config(&self) -> Option<&ConfigError> {
        match self {
            Self::Config(err) => Some(err),
            _ => None,
        }
    }

    /// Follows `TargetFailed` wrappers down to the error a stage returned.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::TargetFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Errors raised by registering or looking up targets.
///
/// These are setup mistakes rather than build failures. The library returns
/// them; only the dispatcher turns them into an exit code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A target with this name is already registered.
    #[error("Duplicate target name: {0}")]
    DuplicateTarget(String),

    /// No target with this name is registered.
    #[error("Unrecognized target: {0}")]
    UnknownTarget(String),

    /// A stage needed the registry but the context has none attached.
    #[error("no target registry is attached to the context")]
    NoRegistry,
}
