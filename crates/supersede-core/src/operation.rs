//! Operation sources and the awaitable returned by [`Tracker::next`].

use std::fmt;
use std::future::{Future, IntoFuture};
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture};

use crate::cancel::OperationContext;
use crate::record::{OperationId, OperationRecord};
use crate::tracker::Tracker;

type Factory<'a, T, E> =
    Box<dyn FnOnce(OperationContext) -> Result<BoxFuture<'a, Result<T, E>>, E> + Send + 'a>;

/// What [`Tracker::next`] should run.
pub enum Source<'a, T, E> {
    /// An operation that is already under way.
    Future(BoxFuture<'a, Result<T, E>>),
    /// Starts the operation; called synchronously inside `next`.
    Factory(Factory<'a, T, E>),
    /// An operation that has already finished.
    Ready(Result<T, E>),
}

impl<'a, T, E> Source<'a, T, E>
where
    T: Send + 'a,
    E: Send + 'a,
{
    pub fn future<F>(fut: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'a,
    {
        Self::Future(fut.boxed())
    }

    /// Wraps a factory that receives the operation's [`OperationContext`].
    ///
    /// An `Err` returned by the factory itself becomes the operation's
    /// failure; tracker bookkeeping still runs for it.
    pub fn factory<F, Fut>(factory: F) -> Self
    where
        F: FnOnce(OperationContext) -> Result<Fut, E> + Send + 'a,
        Fut: Future<Output = Result<T, E>> + Send + 'a,
    {
        Self::Factory(Box::new(move |context| {
            factory(context).map(|fut| fut.boxed())
        }))
    }

    pub fn ready(result: Result<T, E>) -> Self {
        Self::Ready(result)
    }

    pub fn value(value: T) -> Self {
        Self::Ready(Ok(value))
    }

    pub(crate) fn start(self, context: OperationContext) -> BoxFuture<'a, Result<T, E>> {
        match self {
            Self::Future(fut) => fut,
            Self::Factory(factory) => match factory(context) {
                Ok(fut) => fut,
                Err(err) => future::ready(Err(err)).boxed(),
            },
            Self::Ready(result) => future::ready(result).boxed(),
        }
    }
}

impl<T, E> fmt::Debug for Source<'_, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Future(_) => "Future",
            Self::Factory(_) => "Factory",
            Self::Ready(_) => "Ready",
        };
        f.debug_tuple("Source").field(&kind).finish_non_exhaustive()
    }
}

/// Outcome of an operation together with its supersession flag.
#[derive(Debug)]
pub struct Settled<T, E> {
    pub id: OperationId,
    /// False if a newer operation replaced this one before it finished.
    pub is_current: bool,
    pub result: Result<T, E>,
}

/// Finishes a record exactly once: when the operation settles, or when the
/// operation is dropped unsettled.
struct Completion {
    tracker: Tracker,
    record: Arc<OperationRecord>,
    is_current: Option<bool>,
}

impl Completion {
    fn finish(&mut self) -> bool {
        match self.is_current {
            Some(is_current) => is_current,
            None => {
                let is_current = self.tracker.finish(&self.record);
                self.is_current = Some(is_current);
                is_current
            }
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.is_current.is_none() {
            tracing::debug!(op = %self.record.id(), "operation dropped before settling");
            self.finish();
        }
    }
}

/// An operation started by [`Tracker::next`].
///
/// Tracker bookkeeping has already happened by the time this value exists;
/// awaiting it drives the operation and reports whether it was superseded.
/// Awaiting it directly yields the raw result. The combinators mirror
/// success/failure completion callbacks; each receives the value and whether
/// the operation is still current.
pub struct Operation<'a, T, E> {
    completion: Completion,
    context: OperationContext,
    future: BoxFuture<'a, Result<T, E>>,
}

impl<'a, T, E> Operation<'a, T, E> {
    pub(crate) fn new(
        tracker: Tracker,
        record: Arc<OperationRecord>,
        context: OperationContext,
        future: BoxFuture<'a, Result<T, E>>,
    ) -> Self {
        Self {
            completion: Completion {
                tracker,
                record,
                is_current: None,
            },
            context,
            future,
        }
    }

    pub fn id(&self) -> OperationId {
        self.completion.record.id()
    }

    pub fn is_current(&self) -> bool {
        self.completion.record.is_current()
    }

    pub fn context(&self) -> &OperationContext {
        &self.context
    }

    /// Waits for the operation and reports its result and current flag.
    pub async fn settled(self) -> Settled<T, E> {
        let Self {
            mut completion,
            future,
            ..
        } = self;
        let result = future.await;
        let is_current = completion.finish();
        Settled {
            id: completion.record.id(),
            is_current,
            result,
        }
    }

    /// Transforms a success; failures pass through untouched.
    pub async fn then<U, S, SFut>(self, on_success: S) -> Result<U, E>
    where
        S: FnOnce(T, bool) -> SFut,
        SFut: IntoFuture<Output = Result<U, E>>,
    {
        let Settled {
            is_current, result, ..
        } = self.settled().await;
        match result {
            Ok(value) => on_success(value, is_current).await,
            Err(err) => Err(err),
        }
    }

    /// Handles a failure; successes pass through untouched.
    pub async fn or_else<F, FFut>(self, on_failure: F) -> Result<T, E>
    where
        F: FnOnce(E, bool) -> FFut,
        FFut: IntoFuture<Output = Result<T, E>>,
    {
        let Settled {
            is_current, result, ..
        } = self.settled().await;
        match result {
            Ok(value) => Ok(value),
            Err(err) => on_failure(err, is_current).await,
        }
    }

    /// Routes the outcome to exactly one callback.
    ///
    /// A failure produced by `on_success` is returned as is, never handed to
    /// `on_failure`.
    pub async fn then_or_else<U, S, SFut, F, FFut>(
        self,
        on_success: S,
        on_failure: F,
    ) -> Result<U, E>
    where
        S: FnOnce(T, bool) -> SFut,
        SFut: IntoFuture<Output = Result<U, E>>,
        F: FnOnce(E, bool) -> FFut,
        FFut: IntoFuture<Output = Result<U, E>>,
    {
        let Settled {
            is_current, result, ..
        } = self.settled().await;
        match result {
            Ok(value) => on_success(value, is_current).await,
            Err(err) => on_failure(err, is_current).await,
        }
    }

    pub async fn map<U, M>(self, map: M) -> Result<U, E>
    where
        M: FnOnce(T, bool) -> U,
    {
        let Settled {
            is_current, result, ..
        } = self.settled().await;
        result.map(|value| map(value, is_current))
    }
}

impl<'a, T, E> IntoFuture for Operation<'a, T, E>
where
    T: Send + 'a,
    E: Send + 'a,
{
    type Output = Result<T, E>;
    type IntoFuture = BoxFuture<'a, Result<T, E>>;

    fn into_future(self) -> Self::IntoFuture {
        async move { self.settled().await.result }.boxed()
    }
}

impl<T, E> fmt::Debug for Operation<'_, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.id())
            .field("is_current", &self.is_current())
            .finish_non_exhaustive()
    }
}
