//! Cancellation token for cooperative cancellation.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use tracing::warn;

/// A callback type for cancellation notifications.
pub type CancelCallback = Box<dyn FnOnce() + Send + Sync>;

/// A token for cooperative cancellation.
///
/// Cancellation is idempotent - only the first cancellation reason is kept.
/// Waiters blocked in [`CancellationToken::cancelled`] are woken when the
/// token is cancelled.
#[derive(Default)]
pub struct CancellationToken {
    /// Whether cancellation has been requested.
    cancelled: AtomicBool,
    /// The reason for cancellation (first one wins).
    reason: RwLock<Option<String>>,
    /// Callbacks to invoke on cancellation, keyed for removal.
    callbacks: RwLock<Vec<(u64, CancelCallback)>>,
    next_callback: AtomicU64,
    /// Callbacks this token registered on its parents.
    links: RwLock<Vec<(Weak<Self>, u64)>>,
    /// Wakes async waiters.
    notify: Notify,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creates a token that is cancelled whenever any of `parents` is.
    ///
    /// If a parent is already cancelled the child starts cancelled with the
    /// parent's reason. Dropping the child removes its callback from every
    /// parent, so a long-lived parent does not accumulate dead links.
    #[must_use]
    pub fn linked(parents: &[&Arc<Self>]) -> Arc<Self> {
        let child = Self::new();
        for parent in parents {
            let weak_child: Weak<Self> = Arc::downgrade(&child);
            let weak_parent: Weak<Self> = Arc::downgrade(parent);
            let id = parent.register(move || {
                if let Some(child) = weak_child.upgrade() {
                    let reason = weak_parent
                        .upgrade()
                        .and_then(|parent| parent.reason())
                        .unwrap_or_default();
                    child.cancel(reason);
                }
            });
            if let Some(id) = id {
                child.links.write().push((Arc::downgrade(parent), id));
            }
        }
        child
    }

    /// Requests cancellation with a reason.
    ///
    /// This is idempotent - only the first reason is kept.
    /// Callbacks are invoked immediately. Panics in callbacks are logged and suppressed.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        *self.reason.write() = Some(reason.into());

        let callbacks: Vec<_> = std::mem::take(&mut *self.callbacks.write());
        for (_, callback) in callbacks {
            if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(callback)) {
                warn!("Cancellation callback panicked: {:?}", e);
            }
        }

        self.notify.notify_waiters();
    }

    /// Registers a callback to be invoked on cancellation.
    ///
    /// If already cancelled, the callback is invoked immediately.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        self.register(callback);
    }

    /// Stores `callback` and returns its id, or runs it at once and returns
    /// `None` if the token is already cancelled.
    fn register<F>(&self, callback: F) -> Option<u64>
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        {
            let mut callbacks = self.callbacks.write();
            if !self.is_cancelled() {
                let id = self.next_callback.fetch_add(1, Ordering::Relaxed);
                callbacks.push((id, Box::new(callback)));
                return Some(id);
            }
        }

        if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(callback)) {
            warn!("Cancellation callback panicked: {:?}", e);
        }
        None
    }

    fn deregister(&self, id: u64) {
        self.callbacks.write().retain(|(key, _)| *key != id);
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }

    /// Waits until the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for CancellationToken {
    fn drop(&mut self) {
        for (parent, id) in self.links.get_mut().drain(..) {
            if let Some(parent) = parent.upgrade() {
                parent.deregister(id);
            }
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}
