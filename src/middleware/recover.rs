//! Panic recovery.
//!
//! A panic inside a handler must not take the connection, or the process,
//! down with it. [`recover`] catches the unwind, turns it into
//! [`Error::Panic`](crate::Error::Panic) and returns it like any other error,
//! so it flows through the normal dispatch path.
//!
//! The backtrace is taken by a panic hook at the point the panic is raised
//! and handed to the recovering future through a thread-local slot: the
//! unwind happens on the thread that polls the future, so both sides see the
//! same slot. The previously installed hook still runs, which keeps the usual
//! `thread '…' panicked at …` line on stderr.

use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::future::{poll_fn, Future};
use std::panic::{self, AssertUnwindSafe};
use std::pin::pin;
use std::sync::{Arc, Once};

use futures::FutureExt;

use super::Middleware;
use crate::context::Context;
use crate::error::{Error, PanicError};
use crate::handler::{BoxFuture, HandlerFn};

thread_local! {
    static LAST_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let trace = Backtrace::force_capture().to_string();
            let _ = LAST_TRACE.try_with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

fn take_trace() -> String {
    LAST_TRACE.with(|slot| slot.borrow_mut().take()).unwrap_or_default()
}

fn clear_trace() {
    LAST_TRACE.with(|slot| *slot.borrow_mut() = None);
}

/// Middleware that converts a panic in the wrapped handler into an error.
pub fn recover() -> Middleware {
    install_hook();
    Arc::new(|next: HandlerFn| -> HandlerFn {
        Arc::new(move |cx: Context| -> BoxFuture<Result<(), Error>> {
            let next = Arc::clone(&next);
            // The call itself happens inside the guarded future, so panics
            // raised before the first `.await` are caught too.
            let guarded = AssertUnwindSafe(async move { next(cx).await }).catch_unwind();
            Box::pin(async move {
                let mut guarded = pin!(guarded);
                // A payload re-raised with `resume_unwind` skips the hook, so
                // the slot is cleared before every poll.
                let outcome = poll_fn(|task| {
                    clear_trace();
                    guarded.as_mut().poll(task)
                })
                .await;
                match outcome {
                    Ok(result) => result,
                    Err(payload) => Err(PanicError::new(payload, take_trace()).into()),
                }
            })
        })
    })
}
