use futures::future::{self, BoxFuture, FutureExt};
use std::future::{Future, IntoFuture};

/// A value that is either available now or will be produced by a future.
///
/// Blocking and suspending code paths both return an `Eventual`, so callers
/// handle them the same way: `.await` it in async code, or [`Eventual::wait`]
/// in blocking code. Waiting on a ready value never touches an executor.
pub enum Eventual<'a, T> {
    Ready(T),
    Pending(BoxFuture<'a, T>),
}

impl<'a, T> Eventual<'a, T> {
    pub fn ready(value: T) -> Self {
        Eventual::Ready(value)
    }

    pub fn pending(fut: impl Future<Output = T> + Send + 'a) -> Self {
        Eventual::Pending(fut.boxed())
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Eventual::Ready(_))
    }

    /// Resolve the value asynchronously
    pub async fn resolve(self) -> T {
        match self {
            Eventual::Ready(v) => v,
            Eventual::Pending(fut) => fut.await,
        }
    }

    /// Resolve the value on the current thread, driving a pending future to
    /// completion with a local executor.
    ///
    /// Do not call this from inside an async runtime worker with a pending value.
    pub fn wait(self) -> T {
        match self {
            Eventual::Ready(v) => v,
            Eventual::Pending(fut) => futures::executor::block_on(fut),
        }
    }

    /// Transform the eventual value
    pub fn map<U, F>(self, f: F) -> Eventual<'a, U>
    where
        F: FnOnce(T) -> U + Send + 'a,
        T: 'a,
        U: 'a,
    {
        match self {
            Eventual::Ready(v) => Eventual::Ready(f(v)),
            Eventual::Pending(fut) => Eventual::Pending(fut.map(f).boxed()),
        }
    }
}

impl<'a, T: Send + 'a> IntoFuture for Eventual<'a, T> {
    type Output = T;
    type IntoFuture = BoxFuture<'a, T>;

    fn into_future(self) -> Self::IntoFuture {
        match self {
            Eventual::Ready(v) => future::ready(v).boxed(),
            Eventual::Pending(fut) => fut,
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Eventual<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Eventual::Ready(v) => f.debug_tuple("Ready").field(v).finish(),
            Eventual::Pending(_) => write!(f, "Pending"),
        }
    }
}
