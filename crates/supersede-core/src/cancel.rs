//! Cancellation tied to supersession.
//!
//! Signals are only created when an operation asks for one through its
//! [`OperationContext`]; operations that never ask cost nothing extra.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

use crate::record::{OperationId, OperationRecord};
use crate::tracker::Counters;

/// Cancellation reason for an operation overtaken by a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superseded {
    /// The operation that lost its current status.
    pub operation: OperationId,
    /// The operation that replaced it, or `None` if it was abandoned.
    pub superseded_by: Option<OperationId>,
}

impl fmt::Display for Superseded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.superseded_by {
            Some(by) => write!(f, "{} superseded by {by}", self.operation),
            None => write!(f, "{} abandoned", self.operation),
        }
    }
}

impl std::error::Error for Superseded {}

/// Cancellation signal for a single operation.
///
/// Cloning yields a handle to the same signal. Two signals compare equal only
/// if they are handles to the same underlying signal.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    operation: OperationId,
    token: CancellationToken,
    reason: Arc<OnceLock<Superseded>>,
}

impl CancelSignal {
    pub(crate) fn new(operation: OperationId) -> Self {
        Self {
            operation,
            token: CancellationToken::new(),
            reason: Arc::new(OnceLock::new()),
        }
    }

    /// Records the reason, then wakes every waiter. Later calls are no-ops.
    pub(crate) fn cancel(&self, reason: Superseded) {
        if self.reason.set(reason).is_ok() {
            tracing::debug!(op = %self.operation, %reason, "cancel signal triggered");
            self.token.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Why the signal fired, if it has.
    pub fn reason(&self) -> Option<Superseded> {
        self.reason.get().copied()
    }

    /// Waits until the operation is superseded.
    pub async fn cancelled(&self) -> Superseded {
        self.token.cancelled().await;
        self.reason().unwrap_or(Superseded {
            operation: self.operation,
            superseded_by: None,
        })
    }

    /// Runs `fut` until it completes or the signal fires, whichever is first.
    ///
    /// An already-cancelled signal returns `Err` without polling `fut`.
    pub async fn run_until_cancelled<F>(&self, fut: F) -> Result<F::Output, Superseded>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            reason = self.cancelled() => Err(reason),
            output = fut => Ok(output),
        }
    }

    /// A token cancelled together with this signal, for APIs that take one.
    ///
    /// Cancelling the returned token does not cancel the signal.
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }
}

impl PartialEq for CancelSignal {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.reason, &other.reason)
    }
}

impl Eq for CancelSignal {}

/// Handed to factory sources; gives access to the operation's cancel signal.
#[derive(Debug, Clone)]
pub struct OperationContext {
    record: Arc<OperationRecord>,
    counters: Arc<Counters>,
}

impl OperationContext {
    pub(crate) fn new(record: Arc<OperationRecord>, counters: Arc<Counters>) -> Self {
        Self { record, counters }
    }

    pub fn id(&self) -> OperationId {
        self.record.id()
    }

    /// Whether the operation is still the tracker's current one.
    pub fn is_current(&self) -> bool {
        self.record.is_current()
    }

    /// Returns the operation's cancel signal, creating it on first access.
    ///
    /// Every call within one operation returns the same signal. If the
    /// operation was superseded before the first call, the signal is
    /// returned already cancelled.
    pub fn signal(&self) -> CancelSignal {
        self.record.signal(&self.counters.signals_created)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn reason() -> Superseded {
        Superseded {
            operation: OperationId(1),
            superseded_by: Some(OperationId(2)),
        }
    }

    #[test]
    fn test_superseded_display() {
        assert_eq!(reason().to_string(), "op#1 superseded by op#2");
        let abandoned = Superseded {
            operation: OperationId(3),
            superseded_by: None,
        };
        assert_eq!(abandoned.to_string(), "op#3 abandoned");
    }

    #[test]
    fn test_first_reason_wins() {
        let signal = CancelSignal::new(OperationId(1));
        assert!(!signal.is_cancelled());
        assert_eq!(signal.reason(), None);

        signal.cancel(reason());
        signal.cancel(Superseded {
            operation: OperationId(1),
            superseded_by: Some(OperationId(9)),
        });
        assert!(signal.is_cancelled());
        assert_eq!(signal.reason(), Some(reason()));
    }

    #[test]
    fn test_clones_are_equal_distinct_signals_are_not() {
        let signal = CancelSignal::new(OperationId(1));
        assert_eq!(signal, signal.clone());
        assert_ne!(signal, CancelSignal::new(OperationId(1)));
    }

    #[test]
    fn test_child_token_follows_signal() {
        let signal = CancelSignal::new(OperationId(1));
        let token = signal.token();
        token.cancel();
        assert!(!signal.is_cancelled());

        let token = signal.token();
        signal.cancel(reason());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_run_until_cancelled_completes_when_not_cancelled() {
        let signal = CancelSignal::new(OperationId(1));
        let out = signal.run_until_cancelled(async { 42 }).await;
        assert_eq!(out, Ok(42));
    }

    #[tokio::test]
    async fn test_run_until_cancelled_skips_future_when_already_cancelled() {
        let signal = CancelSignal::new(OperationId(1));
        signal.cancel(reason());
        let out = signal.run_until_cancelled(async { 42 }).await;
        assert_eq!(out, Err(reason()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_running_future() {
        let signal = CancelSignal::new(OperationId(1));
        let trigger = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel(reason());
        });

        let out = signal
            .run_until_cancelled(tokio::time::sleep(Duration::from_secs(60)))
            .await;
        assert_eq!(out, Err(reason()));
    }
}
