//! Middleware layer.
//!
//! A [`Middleware`] turns one [`HandlerFn`] into another. Middleware is the
//! right place for cross-cutting concerns: structured tracing, request-id
//! injection, authentication-header inspection.
//!
//! Middleware runs in registration order on the way in: the first one passed
//! to [`Router::layer`](crate::Router::layer) is outermost. On the way out
//! each layer sees the error of the layers inside it, after that error has
//! already been dispatched, so inspecting or swallowing it never costs the
//! client its response.
//!
//! Built in:
//! - [`recover`]: panic recovery, always installed around the handler call
//! - [`trace`]: per-request span with method, path, status and latency

mod recover;
mod trace;

use std::future::Future;
use std::sync::Arc;

pub use recover::recover;
pub use trace::trace;

use crate::context::Context;
use crate::dispatch::{self, ErrorHandler};
use crate::error::Error;
use crate::handler::{BoxFuture, HandlerFn};

/// A transformation from handler function to handler function.
pub type Middleware = Arc<dyn Fn(HandlerFn) -> HandlerFn + Send + Sync + 'static>;

/// Builds a middleware from an async function of the request and the next
/// handler in the chain.
///
/// ```rust
/// use http::StatusCode;
/// use tusk::{middleware, Error};
///
/// let require_key = middleware::from_fn(|cx, next| async move {
///     if cx.header("x-api-key").is_none() {
///         return Err(Error::unauthorized());
///     }
///     next(cx).await
/// });
/// ```
pub fn from_fn<F, Fut>(f: F) -> Middleware
where
    F: Fn(Context, HandlerFn) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |next: HandlerFn| -> HandlerFn {
        let f = Arc::clone(&f);
        Arc::new(move |cx: Context| -> BoxFuture<Result<(), Error>> {
            Box::pin(f(cx, Arc::clone(&next)))
        })
    })
}

/// Assembles the chain around `innermost`.
///
/// ```text
/// dispatch(m1(dispatch(m2(dispatch(recover(innermost))))))
/// ```
pub(crate) fn compose(
    middlewares: &[Middleware],
    on_error: &ErrorHandler,
    innermost: HandlerFn,
) -> HandlerFn {
    let mut next = dispatch::wrap(on_error, recover()(innermost));
    for mw in middlewares.iter().rev() {
        next = dispatch::wrap(on_error, mw(next));
    }
    next
}
