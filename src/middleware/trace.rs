//! Per-request tracing span.

use std::time::Instant;

use http::StatusCode;
use tracing::{info, info_span, warn, Instrument};

use super::{from_fn, Middleware};

/// Opens a `request` span carrying method and path, and logs one line per
/// request with the final status and latency. Register it first so it
/// observes the whole chain.
pub fn trace() -> Middleware {
    from_fn(|cx, next| async move {
        let span = info_span!("request", method = %cx.method(), path = cx.path());
        let started = Instant::now();
        let result = next(cx.clone()).instrument(span.clone()).await;

        let status = cx.response_status().unwrap_or(StatusCode::OK).as_u16();
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        span.in_scope(|| match &result {
            Ok(()) => info!(status, elapsed_ms, "request completed"),
            Err(e) => warn!(status, elapsed_ms, error = %e, "request failed"),
        });
        result
    })
}
