use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::cancel::{CancelSignal, Superseded};

/// Identifies one call to [`Tracker::next`](crate::Tracker::next).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperationId(pub u64);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

#[derive(Debug, Default)]
pub(crate) struct OperationSeq {
    last: AtomicU64,
}

impl OperationSeq {
    pub(crate) fn next_id(&self) -> OperationId {
        OperationId(self.last.fetch_add(1, Ordering::Relaxed).wrapping_add(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Current,
    /// `None` when abandoned without a replacement.
    Superseded(Option<OperationId>),
}

#[derive(Debug)]
struct RecordState {
    status: Status,
    signal: Option<CancelSignal>,
}

/// Per-call bookkeeping: the current flag and the lazily created signal.
///
/// The status only ever moves from `Current` to `Superseded`.
#[derive(Debug)]
pub(crate) struct OperationRecord {
    id: OperationId,
    state: Mutex<RecordState>,
}

impl OperationRecord {
    pub(crate) fn new(id: OperationId) -> Arc<Self> {
        Arc::new(Self {
            id,
            state: Mutex::new(RecordState {
                status: Status::Current,
                signal: None,
            }),
        })
    }

    pub(crate) fn id(&self) -> OperationId {
        self.id
    }

    pub(crate) fn is_current(&self) -> bool {
        self.lock().status == Status::Current
    }

    /// Marks the record non-current and cancels its signal if one exists.
    ///
    /// Returns `false` if the record was already superseded.
    pub(crate) fn supersede(&self, by: Option<OperationId>) -> bool {
        let signal = {
            let mut state = self.lock();
            if state.status != Status::Current {
                return false;
            }
            state.status = Status::Superseded(by);
            state.signal.clone()
        };
        if let Some(signal) = signal {
            signal.cancel(self.reason(by));
        }
        true
    }

    /// Returns the record's signal, creating it on first access.
    ///
    /// A signal created after supersession starts out cancelled.
    pub(crate) fn signal(&self, created: &AtomicU64) -> CancelSignal {
        let mut state = self.lock();
        if let Some(signal) = &state.signal {
            return signal.clone();
        }

        let signal = CancelSignal::new(self.id);
        created.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(op = %self.id, "cancel signal created");
        if let Status::Superseded(by) = state.status {
            signal.cancel(self.reason(by));
        }
        state.signal = Some(signal.clone());
        signal
    }

    fn reason(&self, by: Option<OperationId>) -> Superseded {
        Superseded {
            operation: self.id,
            superseded_by: by,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RecordState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let seq = OperationSeq::default();
        assert_eq!(seq.next_id(), OperationId(1));
        assert_eq!(seq.next_id(), OperationId(2));
        assert_eq!(OperationId(7).to_string(), "op#7");
    }

    #[test]
    fn test_supersede_happens_once() {
        let record = OperationRecord::new(OperationId(1));
        assert!(record.is_current());
        assert!(record.supersede(Some(OperationId(2))));
        assert!(!record.is_current());
        assert!(!record.supersede(Some(OperationId(3))));
    }

    #[test]
    fn test_signal_is_memoized() {
        let created = AtomicU64::new(0);
        let record = OperationRecord::new(OperationId(1));
        let first = record.signal(&created);
        let second = record.signal(&created);
        assert_eq!(first, second);
        assert_eq!(created.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_late_signal_keeps_first_superseder() {
        let created = AtomicU64::new(0);
        let record = OperationRecord::new(OperationId(1));
        record.supersede(Some(OperationId(2)));
        let signal = record.signal(&created);
        assert_eq!(
            signal.reason(),
            Some(Superseded {
                operation: OperationId(1),
                superseded_by: Some(OperationId(2)),
            })
        );
    }
}
