//! Deferred delivery of pending-state changes.
//!
//! Transitions are queued in order on an unbounded channel and delivered by
//! one background task, so the callback always runs after the code that
//! caused the transition has yielded, and in the order transitions occurred.
//! Failures and panics inside the callback are logged and never reach an
//! operation.
//!
//! The delivery task is spawned on the first notification made from inside a
//! Tokio runtime. Until then transitions wait in the queue.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

pub(crate) type PendingCallback = Arc<dyn Fn(bool) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug)]
enum Message {
    Pending(bool),
    Flush(oneshot::Sender<()>),
}

/// Receiver and callback, held until the delivery task is spawned.
struct Delivery {
    rx: mpsc::UnboundedReceiver<Message>,
    callback: PendingCallback,
}

pub(crate) struct Notifier {
    tx: mpsc::UnboundedSender<Message>,
    unstarted: Mutex<Option<Delivery>>,
}

impl Notifier {
    pub(crate) fn new(callback: PendingCallback) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            unstarted: Mutex::new(Some(Delivery { rx, callback })),
        }
    }

    pub(crate) fn schedule(&self, pending: bool) {
        if self.tx.send(Message::Pending(pending)).is_err() {
            tracing::debug!(pending, "pending notifier stopped; dropping notification");
        }
        self.ensure_started();
    }

    /// Resolves once everything queued before this call has been delivered.
    ///
    /// Returns immediately if the delivery task could not be started because
    /// no Tokio runtime is running.
    pub(crate) async fn flush(&self) {
        if !self.ensure_started() {
            return;
        }
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Message::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Spawns the delivery task if needed. Returns whether it is running.
    fn ensure_started(&self) -> bool {
        let mut unstarted = self
            .unstarted
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if unstarted.is_none() {
            return true;
        }
        let Ok(handle) = Handle::try_current() else {
            tracing::trace!("no tokio runtime; pending notifications stay queued");
            return false;
        };
        if let Some(Delivery { rx, callback }) = unstarted.take() {
            handle.spawn(deliver_all(rx, callback));
        }
        true
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let started = self
            .unstarted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none();
        f.debug_struct("Notifier")
            .field("started", &started)
            .finish_non_exhaustive()
    }
}

async fn deliver_all(mut rx: mpsc::UnboundedReceiver<Message>, callback: PendingCallback) {
    while let Some(message) = rx.recv().await {
        match message {
            Message::Pending(pending) => deliver(callback.as_ref(), pending),
            Message::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

fn deliver(callback: &(dyn Fn(bool) -> anyhow::Result<()> + Send + Sync), pending: bool) {
    match catch_unwind(AssertUnwindSafe(|| callback(pending))) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            let error = format!("{err:#}");
            tracing::warn!(pending, %error, "pending callback failed");
        }
        Err(_) => {
            tracing::error!(pending, "pending callback panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delivers_in_order_after_flush() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let notifier = Notifier::new(Arc::new(move |pending: bool| -> anyhow::Result<()> {
            sink.lock().unwrap().push(pending);
            Ok(())
        }));

        notifier.schedule(true);
        notifier.schedule(false);
        notifier.schedule(true);
        assert!(seen.lock().unwrap().is_empty(), "delivery must be deferred");

        notifier.flush().await;
        assert_eq!(*seen.lock().unwrap(), vec![true, false, true]);
    }

    #[tokio::test]
    async fn test_callback_failures_do_not_stop_delivery() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let notifier = Notifier::new(Arc::new(move |pending: bool| -> anyhow::Result<()> {
            sink.lock().unwrap().push(pending);
            if pending {
                anyhow::bail!("refusing pending=true");
            }
            panic!("refusing pending=false");
        }));

        notifier.schedule(true);
        notifier.schedule(false);
        notifier.schedule(true);
        notifier.flush().await;

        assert_eq!(*seen.lock().unwrap(), vec![true, false, true]);
    }

    #[test]
    fn test_queues_without_runtime_and_delivers_once_one_exists() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let notifier = Notifier::new(Arc::new(move |pending: bool| -> anyhow::Result<()> {
            sink.lock().unwrap().push(pending);
            Ok(())
        }));

        notifier.schedule(true);
        notifier.schedule(false);
        assert!(seen.lock().unwrap().is_empty());

        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        rt.block_on(notifier.flush());
        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    }
}
