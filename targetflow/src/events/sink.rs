//! Where lifecycle events go.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

/// Receives stage and target lifecycle events.
///
/// Targets deliver their events with [`EventSink::emit`]; stages use
/// [`EventSink::try_emit`] so that reporting never delays the race between an
/// operation and its context.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Delivers an event.
    async fn emit(&self, event_type: &str, data: Option<Value>);

    /// Delivers an event without waiting. Must not panic.
    fn try_emit(&self, event_type: &str, data: Option<Value>);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<Value>) {}

    fn try_emit(&self, _event_type: &str, _data: Option<Value>) {}
}

/// Writes each event as a debug-level `tracing` record.
///
/// The `name`, `run_id`, `duration_ms` and `error` fields of a lifecycle
/// payload become fields of the record, so `RUST_LOG=targetflow=debug` with
/// `--log-format json` yields one machine-readable line per event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventSink;

impl LoggingEventSink {
    /// Creates a logging sink.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn record(event_type: &str, data: Option<&Value>) {
        let field = |key: &str| data.and_then(|d| d.get(key)).filter(|v| !v.is_null());
        let text = |key: &str| field(key).and_then(Value::as_str).unwrap_or_default();
        tracing::debug!(
            event_type,
            name = text("name"),
            run_id = text("run_id"),
            duration_ms = field("duration_ms").and_then(serde_json::Value::as_u64),
            error = field("error").and_then(serde_json::Value::as_str),
            "event {event_type}"
        );
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        Self::record(event_type, data.as_ref());
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        Self::record(event_type, data.as_ref());
    }
}

/// An event type and its payload.
pub type RecordedEvent = (String, Option<Value>);

/// Keeps every event in memory, in arrival order.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<RecordedEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of events received.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Returns events of exactly `event_type`.
    #[must_use]
    pub fn events_of_type(&self, event_type: &str) -> Vec<RecordedEvent> {
        self.events
            .read()
            .iter()
            .filter(|(t, _)| t == event_type)
            .cloned()
            .collect()
    }

    /// Counts events of exactly `event_type`.
    #[must_use]
    pub fn count(&self, event_type: &str) -> usize {
        self.events
            .read()
            .iter()
            .filter(|(t, _)| t == event_type)
            .count()
    }

    /// Returns the payload `name` of every `event_type` event, in order.
    #[must_use]
    pub fn names_of(&self, event_type: &str) -> Vec<String> {
        self.events_of_type(event_type)
            .into_iter()
            .filter_map(|(_, data)| data?.get("name")?.as_str().map(ToString::to_string))
            .collect()
    }

    fn push(&self, event_type: &str, data: Option<Value>) {
        self.events.write().push((event_type.to_string(), data));
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.push(event_type, data);
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.push(event_type, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{LifecyclePayload, STAGE_COMPLETED, STAGE_STARTED, TARGET_STARTED};
    use crate::testing::LogCapture;
    use std::time::Duration;

    #[tokio::test(flavor = "current_thread")]
    async fn test_logging_sink_records_payload_fields() {
        let capture = LogCapture::new().verbose();
        let _guard = capture.install();

        let payload = LifecyclePayload::finished(
            "lint",
            None,
            Duration::from_millis(7),
            Some("clippy failed".to_string()),
        );
        LoggingEventSink::new()
            .emit("stage.failed", payload.into_value())
            .await;

        assert!(capture.contains("event stage.failed"));
        assert!(capture.contains("lint"));
        assert!(capture.contains("clippy failed"));
    }

    #[test]
    fn test_logging_sink_tolerates_missing_payload() {
        LoggingEventSink::new().try_emit(TARGET_STARTED, None);
        NoOpEventSink.try_emit(TARGET_STARTED, None);
    }

    #[tokio::test]
    async fn test_collecting_sink_queries() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit(STAGE_STARTED, LifecyclePayload::started("a", None).into_value())
            .await;
        sink.try_emit(STAGE_STARTED, LifecyclePayload::started("b", None).into_value());
        sink.try_emit(
            STAGE_COMPLETED,
            LifecyclePayload::finished("a", None, Duration::ZERO, None).into_value(),
        );
        sink.try_emit(TARGET_STARTED, None);

        assert_eq!(sink.len(), 4);
        assert_eq!(sink.count(STAGE_STARTED), 2);
        assert_eq!(sink.events_of_type(STAGE_COMPLETED).len(), 1);
        assert_eq!(sink.names_of(STAGE_STARTED), vec!["a", "b"]);
        assert!(sink.names_of(TARGET_STARTED).is_empty());
    }
}
