use super::{Eventual, NormalizedRequest, NormalizedResponse};
use crate::ids::RequestId;
use futures::future::{BoxFuture, FutureExt};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

/// What a business handler returns
pub type HandlerResult = anyhow::Result<NormalizedResponse>;

type BlockingFn = dyn Fn(&mut NormalizedRequest) -> HandlerResult + Send + Sync;
type SuspendingFn = dyn for<'a> Fn(&'a mut NormalizedRequest) -> BoxFuture<'a, HandlerResult> + Send + Sync;

/// A business handler, either blocking or suspending.
///
/// ```rust
/// use brrtguard::lifecycle::{Handler, NormalizedResponse};
/// use futures::FutureExt;
/// use http::StatusCode;
///
/// let blocking = Handler::blocking(|_req| Ok(NormalizedResponse::new(StatusCode::NO_CONTENT)));
/// let suspending = Handler::suspending(|req| {
///     async move {
///         req.insert_authz("sub", serde_json::json!("u1"));
///         Ok(NormalizedResponse::new(StatusCode::NO_CONTENT))
///     }
///     .boxed()
/// });
/// assert!(!blocking.is_suspending());
/// assert!(suspending.is_suspending());
/// ```
#[derive(Clone)]
pub enum Handler {
    Blocking(Arc<BlockingFn>),
    Suspending(Arc<SuspendingFn>),
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Handler::Blocking(_) => write!(f, "Handler::Blocking"),
            Handler::Suspending(_) => write!(f, "Handler::Suspending"),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn panicked(request_id: RequestId, panic: &(dyn std::any::Any + Send)) -> anyhow::Error {
    let panic_message = panic_message(panic);
    error!(
        request_id = %request_id,
        panic_message = %panic_message,
        "Handler panicked - CRITICAL"
    );
    anyhow::anyhow!("handler panicked: {panic_message}")
}

impl Handler {
    pub fn blocking<F>(f: F) -> Self
    where
        F: Fn(&mut NormalizedRequest) -> HandlerResult + Send + Sync + 'static,
    {
        Handler::Blocking(Arc::new(f))
    }

    pub fn suspending<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a mut NormalizedRequest) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        Handler::Suspending(Arc::new(f))
    }

    #[must_use]
    pub fn is_suspending(&self) -> bool {
        matches!(self, Handler::Suspending(_))
    }

    /// Call the handler. Panics are turned into handler errors.
    ///
    /// Blocking handlers run to completion before this returns; suspending ones
    /// return a pending [`Eventual`] that runs when awaited.
    pub fn invoke<'a>(&self, req: &'a mut NormalizedRequest) -> Eventual<'a, HandlerResult> {
        let request_id = req.request_id;
        match self {
            Handler::Blocking(f) => {
                let result = catch_unwind(AssertUnwindSafe(|| f(req)))
                    .unwrap_or_else(|panic| Err(panicked(request_id, panic.as_ref())));
                Eventual::Ready(result)
            }
            Handler::Suspending(f) => {
                // `{ req }` moves the borrow in so the future can keep it for `'a`
                let started = catch_unwind(AssertUnwindSafe(move || { let req = req; f(req) }));
                let fut = match started {
                    Ok(fut) => fut,
                    Err(panic) => return Eventual::Ready(Err(panicked(request_id, panic.as_ref()))),
                };
                let fut = AssertUnwindSafe(fut)
                    .catch_unwind()
                    .map(move |outcome| outcome.unwrap_or_else(|panic| Err(panicked(request_id, panic.as_ref()))));
                Eventual::pending(fut)
            }
        }
    }
}
