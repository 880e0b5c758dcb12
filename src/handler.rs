//! Handler trait, provider contract and the per-request lifecycle.
//!
//! # From route to business logic
//!
//! A route is registered with a *provider*: a function that builds a fresh
//! handler value for every request. The handler exposes the input classes it
//! wants bound and then runs with a [`Context`]:
//!
//! ```text
//! provider(&cx) -> Result<H, Error>          ← new instance, never shared
//!        ↓
//! binder: Query → URLParams → Body           ← each validated right away
//!        ↓
//! handler.handle(cx).await                   ← consumes the instance
//! ```
//!
//! Any `Err` on the way skips the remaining steps and travels back out
//! through the middleware chain to the error dispatcher.
//!
//! # How async handlers are stored
//!
//! Routes with different handler types live in one table, so the lifecycle
//! above is erased into an [`Endpoint`]: one `Arc<dyn Fn>` returning a
//! boxed future. The runtime cost per request is one `Arc` clone and one
//! virtual call.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::error;

use crate::bind::{Binder, Input, Payload};
use crate::context::Context;
use crate::error::Error;

/// A heap-allocated, type-erased future.
///
/// `Send + 'static` let tokio move the future across threads safely.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// A request handler function: the unit middleware wraps.
pub type HandlerFn = Arc<dyn Fn(Context) -> BoxFuture<Result<(), Error>> + Send + Sync + 'static>;

/// A route's erased lifecycle, waiting for the router's binder.
pub(crate) type Endpoint =
    Arc<dyn Fn(Context, Arc<Binder>) -> BoxFuture<Result<(), Error>> + Send + Sync + 'static>;

/// Application logic for one route.
///
/// Each accessor returning `Some` opts the handler into binding for that
/// input class. The defaults return `None`: the class is not used.
///
/// ```rust
/// use serde::Deserialize;
/// use http::StatusCode;
/// use tusk::{members, Context, Error, Handler};
/// use tusk::bind::{Input, Payload};
/// use tusk::validate::{Validate, Violations};
///
/// #[derive(Default)]
/// struct Params { id: u64 }
/// members!(Params { id: scalar });
/// impl Validate for Params {}
///
/// #[derive(Default, Deserialize)]
/// struct Rename { name: String }
/// impl Validate for Rename {
///     fn validate(&self, v: &mut Violations) { v.required("name", &self.name); }
/// }
///
/// #[derive(Default)]
/// struct RenameUser { params: Params, body: Rename }
///
/// impl Handler for RenameUser {
///     fn url_params(&mut self) -> Option<&mut dyn Input> { Some(&mut self.params) }
///     fn body(&mut self) -> Option<&mut dyn Payload> { Some(&mut self.body) }
///
///     async fn handle(self, cx: Context) -> Result<(), Error> {
///         cx.write_text(StatusCode::OK, format!("{} is now {}", self.params.id, self.body.name))
///     }
/// }
/// ```
pub trait Handler: Send + 'static {
    fn query(&mut self) -> Option<&mut dyn Input> { None }
    fn url_params(&mut self) -> Option<&mut dyn Input> { None }
    fn body(&mut self) -> Option<&mut dyn Payload> { None }

    /// Runs the business logic. Called at most once per instance.
    fn handle(self, cx: Context) -> impl Future<Output = Result<(), Error>> + Send;
}

/// What a provider may return: a handler, or `Option` of one.
///
/// `None` means the provider is misconfigured. It is reported as a
/// [`Error::Config`] and, in debug builds, raised as a panic so it cannot
/// go unnoticed during development.
pub trait IntoHandler: Send + 'static {
    type Handler: Handler;
    fn into_handler(self) -> Option<Self::Handler>;
}

impl<H: Handler> IntoHandler for H {
    type Handler = H;
    fn into_handler(self) -> Option<H> { Some(self) }
}

impl<H: Handler> IntoHandler for Option<H> {
    type Handler = H;
    fn into_handler(self) -> Option<H> { self }
}

/// Erases a provider into the full create → bind → invoke lifecycle.
pub(crate) fn endpoint<P, R>(provider: P) -> Endpoint
where
    P: Fn(&Context) -> Result<R, Error> + Send + Sync + 'static,
    R: IntoHandler,
{
    let provider = Arc::new(provider);
    Arc::new(move |cx: Context, binder: Arc<Binder>| -> BoxFuture<Result<(), Error>> {
        let provider = Arc::clone(&provider);
        Box::pin(async move {
            let Some(mut handler) = provider(&cx)?.into_handler() else {
                return Err(missing_handler(&cx));
            };
            binder.bind(&mut handler, &cx)?;
            handler.handle(cx).await
        })
    })
}

fn missing_handler(cx: &Context) -> Error {
    let message = format!("handler provider returned no handler for {} {}", cx.method(), cx.path());
    error!("{message}");
    if cfg!(debug_assertions) {
        panic!("{message}");
    }
    Error::config(message)
}

// ── Plain functions ───────────────────────────────────────────────────────────

/// Handler for routes that bind nothing: a plain `async fn(Context)`.
pub(crate) struct FnHandler<F>(pub(crate) Arc<F>);

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    fn handle(self, cx: Context) -> impl Future<Output = Result<(), Error>> + Send {
        (self.0)(cx)
    }
}
