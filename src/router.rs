//! Radix-tree request router.
//!
//! One tree per HTTP method, O(path-length) lookup. Each route holds a
//! handler provider; middleware, the error handler and the binder config are
//! router-wide. Build the router once at startup and hand it to
//! [`Server::serve`](crate::Server::serve): after that it is shared
//! read-only across every in-flight request.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;
use tracing::debug;

use crate::bind::Binder;
use crate::config::Config;
use crate::context::Context;
use crate::dispatch::{self, ErrorHandler};
use crate::error::Error;
use crate::handler::{self, Endpoint, FnHandler, HandlerFn, IntoHandler};
use crate::middleware::{self, Middleware};
use crate::response::Response;

/// The application router.
///
/// Every builder method returns `self`, so registration chains naturally:
///
/// ```rust,no_run
/// # use tusk::{Context, Error, Handler, Router, middleware};
/// # #[derive(Default)] struct GetUser;
/// # impl Handler for GetUser {
/// #     async fn handle(self, _cx: Context) -> Result<(), Error> { Ok(()) }
/// # }
/// # async fn health(_cx: Context) -> Result<(), Error> { Ok(()) }
/// let app = Router::new()
///     .layer(middleware::trace())
///     .get("/users/{id}", |_cx| Ok(GetUser::default()))
///     .get_fn("/healthz", health);
/// ```
pub struct Router {
    routes: HashMap<Method, MatchitRouter<usize>>,
    endpoints: Vec<Route>,
    middlewares: Vec<Middleware>,
    on_error: ErrorHandler,
    config: Config,
    binder: Arc<Binder>,
}

/// A registered endpoint and its middleware chain, assembled on first use.
struct Route {
    endpoint: Endpoint,
    chain: OnceLock<HandlerFn>,
}

enum Lookup {
    Found(usize, Vec<(String, String)>),
    MethodNotAllowed,
    NotFound,
}

impl Router {
    pub fn new() -> Self {
        let config = Config::default();
        Self {
            routes: HashMap::new(),
            endpoints: Vec::new(),
            middlewares: Vec::new(),
            on_error: Arc::new(dispatch::dispatch),
            binder: Arc::new(Binder::new(&config)),
            config,
        }
    }

    /// Replaces the binder and server limits.
    pub fn config(mut self, config: Config) -> Self {
        self.binder = Arc::new(Binder::new(&config));
        self.config = config;
        self.reset_chains();
        self
    }

    /// Appends a middleware. The first one added runs outermost.
    pub fn layer(mut self, mw: Middleware) -> Self {
        self.middlewares.push(mw);
        self.reset_chains();
        self
    }

    /// Replaces the default [`dispatch`](crate::dispatch::dispatch).
    ///
    /// The replacement is called once per layer an error passes through and
    /// must write through [`Context::write`], which refuses every write
    /// after the first.
    pub fn error_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context, &Error) + Send + Sync + 'static,
    {
        self.on_error = Arc::new(f);
        self.reset_chains();
        self
    }

    /// Registers a handler provider for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax and are bound into the handler's
    /// `URLParams` group.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with one already
    /// registered for `method`.
    pub fn on<P, R>(self, method: Method, path: &str, provider: P) -> Self
    where
        P: Fn(&Context) -> Result<R, Error> + Send + Sync + 'static,
        R: IntoHandler,
    {
        self.add(method, path, handler::endpoint(provider))
    }

    /// Registers a plain async function that binds nothing.
    pub fn on_fn<F, Fut>(self, method: Method, path: &str, f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        let f = Arc::new(f);
        self.on(method, path, move |_| Ok(FnHandler(Arc::clone(&f))))
    }

    fn add(mut self, method: Method, path: &str, endpoint: Endpoint) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, self.endpoints.len())
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self.endpoints.push(Route { endpoint, chain: OnceLock::new() });
        self
    }

    fn reset_chains(&mut self) {
        for route in &mut self.endpoints {
            route.chain = OnceLock::new();
        }
    }

    /// The composed chain for a route. Built once, then shared by every
    /// request that hits it.
    fn chain(&self, index: usize) -> &HandlerFn {
        let route = &self.endpoints[index];
        route.chain.get_or_init(|| {
            let endpoint = Arc::clone(&route.endpoint);
            let binder = Arc::clone(&self.binder);
            let innermost: HandlerFn = Arc::new(move |cx: Context| endpoint(cx, Arc::clone(&binder)));
            middleware::compose(&self.middlewares, &self.on_error, innermost)
        })
    }

    pub(crate) fn max_body_size(&self) -> usize {
        self.config.max_body_size()
    }

    fn lookup(&self, method: &Method, path: &str) -> Lookup {
        if let Some(matched) = self.routes.get(method).and_then(|tree| tree.at(path).ok()) {
            let params = matched.params.iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect();
            return Lookup::Found(*matched.value, params);
        }
        if self.routes.values().any(|tree| tree.at(path).is_ok()) {
            Lookup::MethodNotAllowed
        } else {
            Lookup::NotFound
        }
    }

    /// Runs one request through routing, middleware, binding, the handler
    /// and error dispatch, and returns the single response it produced.
    pub async fn respond(&self, req: http::Request<Bytes>) -> Response {
        let (index, params) = match self.lookup(req.method(), req.uri().path()) {
            Lookup::Found(index, params) => (index, params),
            Lookup::MethodNotAllowed => return Response::status(StatusCode::METHOD_NOT_ALLOWED),
            Lookup::NotFound => return Response::status(StatusCode::NOT_FOUND),
        };

        let cx = Context::new(req, params);
        if let Err(e) = self.chain(index)(cx.clone()).await {
            debug!(method = %cx.method(), path = cx.path(), "request ended with error: {e}");
        }
        cx.finish()
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

macro_rules! shortcuts {
    ($($name:ident, $name_fn:ident => $method:ident;)*) => {
        impl Router {
            $(
                #[doc = concat!("Shortcut for [`Router::on`] with `", stringify!($method), "`.")]
                pub fn $name<P, R>(self, path: &str, provider: P) -> Self
                where
                    P: Fn(&Context) -> Result<R, Error> + Send + Sync + 'static,
                    R: IntoHandler,
                {
                    self.on(Method::$method, path, provider)
                }

                #[doc = concat!("Shortcut for [`Router::on_fn`] with `", stringify!($method), "`.")]
                pub fn $name_fn<F, Fut>(self, path: &str, f: F) -> Self
                where
                    F: Fn(Context) -> Fut + Send + Sync + 'static,
                    Fut: Future<Output = Result<(), Error>> + Send + 'static,
                {
                    self.on_fn(Method::$method, path, f)
                }
            )*
        }
    };
}

shortcuts! {
    get,     get_fn     => GET;
    post,    post_fn    => POST;
    put,     put_fn     => PUT;
    patch,   patch_fn   => PATCH;
    delete,  delete_fn  => DELETE;
    head,    head_fn    => HEAD;
    options, options_fn => OPTIONS;
}
