//! The tracker: owns the "current operation" slot.
//!
//! The slot is guarded by a mutex that is held only while records are swapped
//! or finished, never across an await. Pending notifications are queued while
//! the lock is held, so their order matches the order of slot transitions.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::cancel::OperationContext;
use crate::notify::{Notifier, PendingCallback};
use crate::operation::{Operation, Source};
use crate::record::{OperationId, OperationRecord, OperationSeq};

#[derive(Debug, Default)]
pub(crate) struct Counters {
    started: AtomicU64,
    superseded: AtomicU64,
    completed: AtomicU64,
    pub(crate) signals_created: AtomicU64,
}

/// Snapshot of a tracker's lifetime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    /// Calls to `next`.
    pub started: u64,
    /// Operations that lost their current status before finishing.
    pub superseded: u64,
    /// Operations that settled or were dropped.
    pub completed: u64,
    /// Cancel signals actually created.
    pub signals_created: u64,
}

#[derive(Debug, Default)]
struct Inner {
    current: Mutex<Option<Arc<OperationRecord>>>,
    seq: OperationSeq,
    counters: Arc<Counters>,
    notifier: Option<Notifier>,
}

/// Tracks the most recently started operation.
///
/// Cloning yields another handle to the same tracker.
#[derive(Clone, Default)]
pub struct Tracker {
    inner: Arc<Inner>,
}

impl Tracker {
    /// Creates a tracker without a pending callback.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> TrackerBuilder {
        TrackerBuilder::default()
    }

    /// A handle that does not keep the tracker alive.
    pub fn downgrade(&self) -> WeakTracker {
        WeakTracker {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Starts `source` as the current operation, superseding the previous one.
    ///
    /// The bookkeeping happens before this returns: the previous operation
    /// is marked superseded and its cancel signal (if any) fires, and a
    /// deferred `pending(true)` is queued if nothing was in flight. A factory
    /// source is invoked here, before the swap.
    pub fn next<'a, T, E>(&self, source: Source<'a, T, E>) -> Operation<'a, T, E>
    where
        T: Send + 'a,
        E: Send + 'a,
    {
        let record = OperationRecord::new(self.inner.seq.next_id());
        let context = OperationContext::new(Arc::clone(&record), Arc::clone(&self.inner.counters));
        let future = source.start(context.clone());
        self.install(&record);
        Operation::new(self.clone(), record, context, future)
    }

    /// Supersedes the current operation without starting a new one.
    ///
    /// Returns the abandoned operation's id, or `None` if nothing was in
    /// flight.
    pub fn abandon(&self) -> Option<OperationId> {
        let mut current = self.lock_current();
        let record = current.take()?;
        if record.supersede(None) {
            self.inner.counters.superseded.fetch_add(1, Ordering::Relaxed);
        }
        self.schedule_pending(false);
        drop(current);

        tracing::debug!(op = %record.id(), "operation abandoned");
        Some(record.id())
    }

    /// Whether an operation is in flight right now.
    ///
    /// This reads the slot directly; the pending callback sees the same
    /// transitions slightly later.
    pub fn is_pending(&self) -> bool {
        self.lock_current().is_some()
    }

    pub fn current_id(&self) -> Option<OperationId> {
        self.lock_current().as_ref().map(|record| record.id())
    }

    pub fn stats(&self) -> TrackerStats {
        let counters = &self.inner.counters;
        TrackerStats {
            started: counters.started.load(Ordering::Relaxed),
            superseded: counters.superseded.load(Ordering::Relaxed),
            completed: counters.completed.load(Ordering::Relaxed),
            signals_created: counters.signals_created.load(Ordering::Relaxed),
        }
    }

    /// Waits until every pending notification queued so far was delivered.
    pub async fn flush(&self) {
        if let Some(notifier) = &self.inner.notifier {
            notifier.flush().await;
        }
    }

    fn install(&self, record: &Arc<OperationRecord>) {
        self.inner.counters.started.fetch_add(1, Ordering::Relaxed);

        let mut current = self.lock_current();
        match current.replace(Arc::clone(record)) {
            Some(previous) => {
                if previous.supersede(Some(record.id())) {
                    self.inner.counters.superseded.fetch_add(1, Ordering::Relaxed);
                }
                tracing::debug!(
                    op = %record.id(),
                    superseded = %previous.id(),
                    "operation started"
                );
            }
            None => {
                self.schedule_pending(true);
                tracing::debug!(op = %record.id(), "operation started");
            }
        }
    }

    /// Clears the slot if `record` still owns it. Returns whether it did.
    pub(crate) fn finish(&self, record: &OperationRecord) -> bool {
        self.inner.counters.completed.fetch_add(1, Ordering::Relaxed);

        let mut current = self.lock_current();
        let is_current = current
            .as_deref()
            .is_some_and(|owner| std::ptr::eq(owner, record));
        if is_current {
            *current = None;
            self.schedule_pending(false);
        }
        drop(current);

        tracing::debug!(op = %record.id(), is_current, "operation settled");
        is_current
    }

    fn schedule_pending(&self, pending: bool) {
        if let Some(notifier) = &self.inner.notifier {
            notifier.schedule(pending);
        }
    }

    fn lock_current(&self) -> MutexGuard<'_, Option<Arc<OperationRecord>>> {
        self.inner
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("current", &self.current_id())
            .field("notifies", &self.inner.notifier.is_some())
            .finish_non_exhaustive()
    }
}

/// Non-owning handle to a [`Tracker`], see [`Tracker::downgrade`].
#[derive(Clone, Debug)]
pub struct WeakTracker {
    inner: Weak<Inner>,
}

impl WeakTracker {
    /// The tracker, unless every `Tracker` handle has been dropped.
    pub fn upgrade(&self) -> Option<Tracker> {
        self.inner.upgrade().map(|inner| Tracker { inner })
    }
}

/// Configures a [`Tracker`].
#[derive(Default)]
pub struct TrackerBuilder {
    on_change_is_pending: Option<PendingCallback>,
}

impl TrackerBuilder {
    /// Called with `true` when the tracker goes from idle to busy and with
    /// `false` when it goes back to idle.
    ///
    /// Calls are deferred to a background task and arrive in transition
    /// order. An `Err` or a panic from the callback is logged and otherwise
    /// ignored.
    ///
    /// The tracker keeps the callback alive. A callback that needs the
    /// tracker should capture a [`WeakTracker`] from [`Tracker::downgrade`];
    /// capturing a `Tracker` clone keeps the tracker alive forever.
    #[must_use]
    pub fn on_change_is_pending<F>(mut self, callback: F) -> Self
    where
        F: Fn(bool) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_change_is_pending = Some(Arc::new(callback));
        self
    }

    /// Builds the tracker. Works with or without a running Tokio runtime;
    /// pending notifications are delivered once one is available.
    pub fn build(self) -> Tracker {
        let notifier = self.on_change_is_pending.map(Notifier::new);
        Tracker {
            inner: Arc::new(Inner {
                notifier,
                ..Inner::default()
            }),
        }
    }
}

impl fmt::Debug for TrackerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerBuilder")
            .field("on_change_is_pending", &self.on_change_is_pending.is_some())
            .finish()
    }
}
