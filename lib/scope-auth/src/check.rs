use std::future::{Future, IntoFuture};

use futures::future::{self, BoxFuture, Either, FutureExt, Shared};

/// A value that is either already known or still being computed.
///
/// Scope predicates, loader initializers and whole scope-map evaluations all
/// produce a `Check`, so that synchronous paths never allocate a future and
/// never yield to the runtime.
pub enum Check<T> {
    Ready(T),
    Pending(BoxFuture<'static, T>),
}

impl<T: Send + 'static> Check<T> {
    pub fn pending<F>(fut: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Check::Pending(fut.boxed())
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Check::Ready(_))
    }

    pub fn map<U, F>(self, f: F) -> Check<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        match self {
            Check::Ready(value) => Check::Ready(f(value)),
            Check::Pending(fut) => Check::Pending(fut.map(f).boxed()),
        }
    }

    /// Chains a computation that may itself be pending.
    pub fn and_then<U, F>(self, f: F) -> Check<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Check<U> + Send + 'static,
    {
        match self {
            Check::Ready(value) => f(value),
            Check::Pending(fut) => {
                Check::Pending(fut.then(move |value| f(value).into_future()).boxed())
            }
        }
    }
}

impl<T, E> Check<Result<T, E>>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Like [`Check::and_then`], but only runs `f` for `Ok` values.
    pub fn and_then_ok<U, F>(self, f: F) -> Check<Result<U, E>>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Check<Result<U, E>> + Send + 'static,
    {
        self.and_then(|result| match result {
            Ok(value) => f(value),
            Err(err) => Check::Ready(Err(err)),
        })
    }
}

impl<T: Send + 'static> IntoFuture for Check<T> {
    type Output = T;
    type IntoFuture = Either<future::Ready<T>, BoxFuture<'static, T>>;

    fn into_future(self) -> Self::IntoFuture {
        match self {
            Check::Ready(value) => Either::Left(future::ready(value)),
            Check::Pending(fut) => Either::Right(fut),
        }
    }
}

impl<T> std::fmt::Debug for Check<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Check::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Check::Pending(_) => f.write_str("Pending"),
        }
    }
}

/// A write-once cache entry holding a [`Check`] that any number of callers can
/// observe. A pending entry is shared, so the underlying future is polled by
/// whoever awaits it and runs at most once.
pub(crate) enum SharedCheck<T: Clone> {
    Settled(T),
    InFlight(Shared<BoxFuture<'static, T>>),
}

impl<T> SharedCheck<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn check(&self) -> Check<T> {
        match self {
            SharedCheck::Settled(value) => Check::Ready(value.clone()),
            SharedCheck::InFlight(shared) => match shared.peek() {
                Some(value) => Check::Ready(value.clone()),
                None => Check::Pending(shared.clone().boxed()),
            },
        }
    }
}

impl<T> From<Check<T>> for SharedCheck<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn from(check: Check<T>) -> Self {
        match check {
            Check::Ready(value) => SharedCheck::Settled(value),
            Check::Pending(fut) => SharedCheck::InFlight(fut.shared()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;

    #[tokio::test]
    async fn ready_values_map_without_a_future() {
        let check = Check::Ready(20).map(|v| v + 1);
        assert!(check.is_ready());
        assert_eq!(check.await, 21);
    }

    #[tokio::test]
    async fn pending_values_chain() {
        let check = Check::pending(async { 2 }).and_then(|v| Check::Ready(v * 10));
        assert!(!check.is_ready());
        assert_eq!(check.await, 20);
    }

    #[tokio::test]
    async fn and_then_ok_skips_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let check: Check<Result<u32, &str>> = Check::Ready(Err("boom"));
        let result = check
            .and_then_ok(move |v| {
                counter.fetch_add(1, Ordering::SeqCst);
                Check::Ready(Ok(v))
            })
            .await;

        assert_eq!(result, Err("boom"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn shared_check_polls_the_inner_future_once() {
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();
        let shared: SharedCheck<u32> = Check::pending(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            7
        })
        .into();

        let (a, b) = futures::join!(
            shared.check().into_future(),
            shared.check().into_future()
        );
        assert_eq!((a, b), (7, 7));
        assert_eq!(polls.load(Ordering::SeqCst), 1);
        // Settled by now, later observers read it synchronously.
        assert!(shared.check().is_ready());
    }
}
