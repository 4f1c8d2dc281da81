//! Lifecycle events for stages and targets.
//!
//! Every stage and target run emits a started event followed by exactly one
//! terminal event. Payloads are JSON objects with at least a `name` field.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RecordedEvent};

use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// A stage started running.
pub const STAGE_STARTED: &str = "stage.started";
/// A stage operation returned success.
pub const STAGE_COMPLETED: &str = "stage.completed";
/// A stage operation returned an error.
pub const STAGE_FAILED: &str = "stage.failed";
/// A stage was abandoned because its context ended.
pub const STAGE_CANCELLED: &str = "stage.cancelled";
/// A target started running.
pub const TARGET_STARTED: &str = "target.started";
/// Every stage of a target succeeded.
pub const TARGET_COMPLETED: &str = "target.completed";
/// A target stopped at a failing stage.
pub const TARGET_FAILED: &str = "target.failed";

/// Payload attached to lifecycle events.
#[derive(Debug, Clone, Serialize)]
pub struct LifecyclePayload {
    /// Stage or target name.
    pub name: String,
    /// The target run this event belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    /// When the event was produced.
    pub timestamp: String,
    /// Elapsed time for terminal events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Error text for failure events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LifecyclePayload {
    /// Creates a payload for a started event.
    #[must_use]
    pub fn started(name: &str, run_id: Option<Uuid>) -> Self {
        Self {
            name: name.to_string(),
            run_id,
            timestamp: crate::utils::iso_timestamp(),
            duration_ms: None,
            error: None,
        }
    }

    /// Creates a payload for a terminal event.
    #[must_use]
    pub fn finished(
        name: &str,
        run_id: Option<Uuid>,
        elapsed: Duration,
        error: Option<String>,
    ) -> Self {
        Self {
            duration_ms: Some(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)),
            error,
            ..Self::started(name, run_id)
        }
    }

    /// Converts the payload into a JSON value for a sink.
    #[must_use]
    pub fn into_value(self) -> Option<serde_json::Value> {
        serde_json::to_value(self).ok()
    }
}
