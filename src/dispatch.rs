//! Error dispatch: the one place an [`Error`] becomes a written response.
//!
//! The router wraps every middleware layer, and the innermost handler call,
//! with the active [`ErrorHandler`]. An error escaping a layer is therefore
//! dispatched at that layer and again at each enclosing one. Only the first
//! dispatch writes; the rest find the response slot taken and do nothing.

use std::sync::Arc;

use tracing::{debug, error};

use crate::context::Context;
use crate::error::Error;
use crate::handler::{BoxFuture, HandlerFn};
use crate::response::Response;

/// Converts an error into a response. Must respect the write-once slot.
pub type ErrorHandler = Arc<dyn Fn(&Context, &Error) + Send + Sync + 'static>;

/// The default [`ErrorHandler`].
///
/// Writes `err` as JSON with the status its variant declares, unless a
/// response has already been written, in which case the error is only logged
/// at debug level.
pub fn dispatch(cx: &Context, err: &Error) {
    if cx.written() {
        debug!(error = %err, "response already written, suppressing error");
        return;
    }

    let status = err.status();
    let response = match serde_json::to_vec(err) {
        Ok(body) => Response::builder().status(status).json(body),
        Err(e) => {
            error!("unable to serialize error response: {e}");
            Response::status(status)
        }
    };

    if cx.write(response).is_err() {
        debug!(error = %err, "response already written, suppressing error");
        return;
    }

    match err {
        Error::Panic(p) => error!(
            method = %cx.method(), path = cx.path(), trace = p.trace(),
            "recovered panic: {}", p.cause()
        ),
        Error::Config(_) | Error::Other(_) => error!(
            method = %cx.method(), path = cx.path(), status = status.as_u16(), "{err}"
        ),
        Error::Status { .. } | Error::Validation(_) => debug!(
            method = %cx.method(), path = cx.path(), status = status.as_u16(), "{err}"
        ),
    }
}

/// Wraps `next` so that any error it returns is dispatched before being
/// passed on to the enclosing layer.
pub(crate) fn wrap(on_error: &ErrorHandler, next: HandlerFn) -> HandlerFn {
    let on_error = Arc::clone(on_error);
    Arc::new(move |cx: Context| -> BoxFuture<Result<(), Error>> {
        let next = Arc::clone(&next);
        let on_error = Arc::clone(&on_error);
        Box::pin(async move {
            let result = next(cx.clone()).await;
            if let Err(err) = &result {
                on_error(&cx, err);
            }
            result
        })
    })
}
