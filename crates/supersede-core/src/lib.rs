//! Latest-operation tracking.
//!
//! A [`Tracker`] remembers which asynchronous operation was requested most
//! recently. Starting a new one through [`Tracker::next`] marks the previous
//! one as superseded and, if that operation asked for one, cancels its
//! [`CancelSignal`]. Completion callbacks are told whether their operation is
//! still the current one, so stale results can be dropped.

mod cancel;
mod notify;
mod operation;
mod record;
mod tracker;

pub use cancel::{CancelSignal, OperationContext, Superseded};
pub use operation::{Operation, Settled, Source};
pub use record::OperationId;
pub use tracker::{Tracker, TrackerBuilder, TrackerStats, WeakTracker};
