//! The execution context handed to every stage.
//!
//! A [`Context`] bundles a cancellation token and an optional deadline with
//! the services a stage needs: the event sink, the command runner, the
//! target registry and the id of the current target run. It is cheap to
//! clone; clones share the same token.

use crate::cancellation::CancellationToken;
use crate::errors::BuildError;
use crate::events::{EventSink, NoOpEventSink};
use crate::registry::Registry;
use crate::run::{CommandRunner, ProcessRunner};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Cancellation, deadline and services for one invocation chain.
#[derive(Clone)]
pub struct Context {
    token: Arc<CancellationToken>,
    deadline: Option<Instant>,
    events: Arc<dyn EventSink>,
    runner: Arc<dyn CommandRunner>,
    registry: Option<Registry>,
    run_id: Option<Uuid>,
}

impl Context {
    /// Creates a root context: never cancelled unless asked, no deadline,
    /// events discarded, commands run as real processes.
    #[must_use]
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            events: Arc::new(NoOpEventSink),
            runner: Arc::new(ProcessRunner),
            registry: None,
            run_id: None,
        }
    }

    /// Creates a child that is cancelled with this context but can also be
    /// cancelled on its own.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: CancellationToken::linked(&[&self.token]),
            ..self.clone()
        }
    }

    /// Creates a child whose deadline is at most `timeout` from now.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Creates a child whose deadline is at most `deadline`.
    ///
    /// A child never outlives its parent: the earlier deadline wins.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut child = self.child();
        child.deadline = Some(self.deadline.map_or(deadline, |d| d.min(deadline)));
        child
    }

    /// Creates a context that ends when either `self` or `other` ends.
    ///
    /// Services and the run id come from `other`.
    #[must_use]
    pub fn joined(&self, other: &Self) -> Self {
        let deadline = match (self.deadline, other.deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self {
            token: CancellationToken::linked(&[&self.token, &other.token]),
            deadline,
            ..other.clone()
        }
    }

    /// Cancels this context and every context derived from it.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.token.cancel(reason);
    }

    /// Returns the error describing why this context ended, if it has.
    #[must_use]
    pub fn err(&self) -> Option<BuildError> {
        if self.token.is_cancelled() {
            return Some(BuildError::Cancelled(self.token.reason().unwrap_or_default()));
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(BuildError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Returns true once the context is cancelled or past its deadline.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Waits until the context is cancelled or its deadline passes.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.token.cancelled() => {}
                    () = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Returns the deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the time left before the deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Returns the event sink.
    #[must_use]
    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    /// Delivers an event to the sink.
    pub async fn emit_event(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.events.emit(event_type, data).await;
    }

    /// Tries to emit an event without blocking.
    pub fn try_emit_event(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.events.try_emit(event_type, data);
    }

    /// Sets the command runner.
    #[must_use]
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Returns the command runner.
    #[must_use]
    pub fn runner(&self) -> &Arc<dyn CommandRunner> {
        &self.runner
    }

    /// Attaches a target registry.
    #[must_use]
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Drops the registry handle. Targets store their registration context,
    /// and a registry must not end up owning a handle to itself.
    #[must_use]
    pub(crate) fn without_registry(mut self) -> Self {
        self.registry = None;
        self
    }

    /// Returns the attached target registry.
    #[must_use]
    pub fn registry(&self) -> Option<&Registry> {
        self.registry.as_ref()
    }

    /// Sets the current target run id.
    #[must_use]
    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Returns the current target run id.
    #[must_use]
    pub fn run_id(&self) -> Option<Uuid> {
        self.run_id
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.token.is_cancelled())
            .field("remaining", &self.remaining())
            .field("runner", &self.runner)
            .field("has_registry", &self.registry.is_some())
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_is_live() {
        let ctx = Context::background();
        assert!(!ctx.is_done());
        assert!(ctx.err().is_none());
        assert!(ctx.remaining().is_none());
        assert!(ctx.registry().is_none());
    }

    #[test]
    fn test_cancel_reaches_children_not_parents() {
        let parent = Context::background();
        let child = parent.child();
        let grandchild = child.with_timeout(Duration::from_secs(60));

        child.cancel("stop");
        assert!(child.is_done());
        assert!(grandchild.is_done());
        assert!(!parent.is_done());

        match grandchild.err() {
            Some(BuildError::Cancelled(reason)) => assert_eq!(reason, "stop"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_child_deadline_never_extends_parent() {
        let parent = Context::background().with_timeout(Duration::from_millis(10));
        let child = parent.with_timeout(Duration::from_secs(60));
        assert!(child.remaining().expect("deadline") <= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_deadline_ends_context() {
        let ctx = Context::background().with_timeout(Duration::from_millis(20));

        tokio::time::timeout(Duration::from_secs(1), ctx.done())
            .await
            .expect("deadline should fire");
        assert!(matches!(ctx.err(), Some(BuildError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn test_joined_ends_with_either_side() {
        let registration = Context::background();
        let invocation = Context::background().with_run_id(Uuid::new_v4());

        let joined = registration.joined(&invocation);
        assert_eq!(joined.run_id(), invocation.run_id());

        registration.cancel("registration ended");
        tokio::time::timeout(Duration::from_secs(1), joined.done())
            .await
            .expect("joined context should end");
        assert!(!invocation.is_done());
    }

    #[test]
    fn test_joined_takes_earliest_deadline() {
        let short = Context::background().with_timeout(Duration::from_millis(50));
        let long = Context::background().with_timeout(Duration::from_secs(60));

        let joined = long.joined(&short);
        assert!(joined.remaining().expect("deadline") <= Duration::from_millis(50));
        let joined = short.joined(&long);
        assert!(joined.remaining().expect("deadline") <= Duration::from_millis(50));
    }
}
