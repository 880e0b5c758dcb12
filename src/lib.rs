//! # tusk
//!
//! Declarative request binding, validation and uniform JSON errors for
//! hyper services.
//!
//! ## What a request goes through
//!
//! - Radix-tree routing, via [`matchit`]
//! - The middleware chain, first registered outermost, with panic recovery
//!   always innermost
//! - A fresh [`Handler`] from the route's provider
//! - Binding of the `Query`, `URLParams` and `Body` groups the handler
//!   exposes, each validated before the next is read
//! - The handler itself
//! - Error dispatch at every layer, so exactly one response reaches the
//!   client however many layers see the error
//!
//! Errors are written as `{"error": "..."}`, or for validation failures as
//! `{"errors": {"<group>": ["...", ...]}}`, with the status their
//! [`Error`] variant declares.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::StatusCode;
//! use serde::{Deserialize, Serialize};
//! use tusk::bind::{Input, Payload};
//! use tusk::validate::{Validate, Violations};
//! use tusk::{members, middleware, Context, Error, Handler, Router, Server};
//!
//! #[derive(Default)]
//! struct UserId { id: u64 }
//! members!(UserId { id: scalar });
//! impl Validate for UserId {}
//!
//! #[derive(Default, Deserialize, Serialize)]
//! struct Profile { name: String, email: String }
//!
//! impl Validate for Profile {
//!     fn validate(&self, v: &mut Violations) {
//!         v.required("name", &self.name);
//!         v.email("email", &self.email);
//!     }
//! }
//!
//! #[derive(Default)]
//! struct UpdateUser { params: UserId, body: Profile }
//!
//! impl Handler for UpdateUser {
//!     fn url_params(&mut self) -> Option<&mut dyn Input> { Some(&mut self.params) }
//!     fn body(&mut self) -> Option<&mut dyn Payload> { Some(&mut self.body) }
//!
//!     async fn handle(self, cx: Context) -> Result<(), Error> {
//!         if self.params.id == 0 {
//!             return Err(Error::entity_not_found());
//!         }
//!         cx.write_json(StatusCode::OK, &self.body)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = Router::new()
//!         .layer(middleware::trace())
//!         .put("/users/{id}", |_cx| Ok(UpdateUser::default()));
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//! ```

mod config;
mod context;
mod error;
mod handler;
mod response;
mod router;
mod server;

pub mod bind;
pub mod dispatch;
pub mod middleware;
pub mod validate;

pub use bind::Group;
pub use config::{Config, DEFAULT_MAX_BODY_SIZE, DEFAULT_MULTIPART_MAX_MEMORY};
pub use context::Context;
pub use dispatch::ErrorHandler;
pub use error::{BoxError, Error, PanicError, ValidationError};
pub use handler::{BoxFuture, Handler, HandlerFn, IntoHandler};
pub use response::{Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
