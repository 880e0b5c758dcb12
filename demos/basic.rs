//! Minimal tusk example: bound and validated JSON endpoints.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl 'http://localhost:3000/users?name=al&tag=admin&tag=ops&limit=5'
//!   curl http://localhost:3000/users/42
//!   curl http://localhost:3000/users/abc                  # 400, urlparams
//!   curl -X POST http://localhost:3000/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"","email":"nope"}'                  # 400, two body errors
//!   curl -X POST http://localhost:3000/users -d 'name=x'  # 400, unknown content type
//!   curl http://localhost:3000/panic                      # 500, server keeps running

use http::StatusCode;
use serde::{Deserialize, Serialize};
use tusk::bind::{Input, Payload};
use tusk::validate::{Validate, Violations};
use tusk::{members, middleware, Config, Context, Error, Handler, Router, Server};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let app = Router::new()
        .config(Config::from_env())
        .layer(middleware::trace())
        .get("/users",       |_cx| Ok(ListUsers::default()))
        .get("/users/{id}",  |_cx| Ok(GetUser::default()))
        .post("/users",      |_cx| Ok(CreateUser::default()))
        .get_fn("/panic",    explode)
        .get_fn("/healthz",  |cx| async move { cx.write_status(StatusCode::NO_CONTENT) });

    Server::bind("0.0.0.0:3000")
        .serve(app)
        .await
        .expect("server error");
}

// GET /users?name=..&tag=..&tag=..&limit=..

#[derive(Serialize)]
struct Search {
    name: String,
    tags: Vec<String>,
    limit: u32,
}

impl Default for Search {
    fn default() -> Self {
        Self { name: String::new(), tags: Vec::new(), limit: 20 }
    }
}

members!(Search {
    name: scalar,
    tags as "tag": sequence,
    limit: scalar,
});

impl Validate for Search {
    fn validate(&self, v: &mut Violations) {
        v.range("limit", self.limit, 1, 100);
    }
}

#[derive(Default)]
struct ListUsers {
    query: Search,
}

impl Handler for ListUsers {
    fn query(&mut self) -> Option<&mut dyn Input> { Some(&mut self.query) }

    async fn handle(self, cx: Context) -> Result<(), Error> {
        cx.write_json(StatusCode::OK, &self.query)
    }
}

// GET /users/{id}

#[derive(Default)]
struct UserId {
    id: u64,
}

members!(UserId { id: scalar });

impl Validate for UserId {}

#[derive(Default)]
struct GetUser {
    params: UserId,
}

impl Handler for GetUser {
    fn url_params(&mut self) -> Option<&mut dyn Input> { Some(&mut self.params) }

    async fn handle(self, cx: Context) -> Result<(), Error> {
        if self.params.id != 42 {
            return Err(Error::entity_not_found());
        }
        cx.write_json(StatusCode::OK, &User { id: 42, name: "alice".into(), email: "alice@example.com".into() })
    }
}

// POST /users

#[derive(Default, Deserialize)]
struct NewUser {
    name: String,
    email: String,
}

impl Validate for NewUser {
    fn validate(&self, v: &mut Violations) {
        v.required("name", &self.name);
        v.email("email", &self.email);
    }
}

#[derive(Default)]
struct CreateUser {
    body: NewUser,
}

impl Handler for CreateUser {
    fn body(&mut self) -> Option<&mut dyn Payload> { Some(&mut self.body) }

    async fn handle(self, cx: Context) -> Result<(), Error> {
        let user = User { id: 99, name: self.body.name, email: self.body.email };
        cx.write_json(StatusCode::CREATED, &user)
    }
}

#[derive(Serialize)]
struct User {
    id: u64,
    name: String,
    email: String,
}

async fn explode(_cx: Context) -> Result<(), Error> {
    panic!("something went badly wrong")
}
