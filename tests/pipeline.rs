use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tusk::bind::{Input, Payload};
use tusk::validate::{Validate, Violations};
use tusk::{members, middleware, Config, Context, Error, Handler, Response, Router};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn get(uri: &str) -> http::Request<Bytes> {
    http::Request::builder().method(Method::GET).uri(uri).body(Bytes::new()).unwrap()
}

fn post(uri: &str, content_type: Option<&str>, body: &str) -> http::Request<Bytes> {
    let mut builder = http::Request::builder().method(Method::POST).uri(uri);
    if let Some(ct) = content_type {
        builder = builder.header("content-type", ct);
    }
    builder.body(Bytes::from(body.to_owned())).unwrap()
}

fn json_of(res: &Response) -> Value {
    serde_json::from_slice(res.body()).unwrap()
}

// ── Handlers ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Search {
    name: String,
    tags: Vec<String>,
    limit: u32,
}

impl Default for Search {
    fn default() -> Self {
        Self { name: "anyone".into(), tags: Vec::new(), limit: 10 }
    }
}

members!(Search {
    name: scalar,
    tags as "tag": sequence,
    limit: scalar,
});

impl Validate for Search {
    fn validate(&self, v: &mut Violations) {
        v.range("limit", self.limit, 1, 50);
    }
}

#[derive(Default)]
struct ListItems {
    query: Search,
}

impl Handler for ListItems {
    fn query(&mut self) -> Option<&mut dyn Input> { Some(&mut self.query) }

    async fn handle(self, cx: Context) -> Result<(), Error> {
        cx.write_json(StatusCode::OK, &self.query)
    }
}

#[derive(Default)]
struct ItemId {
    id: u32,
}

members!(ItemId { id: scalar });

impl Validate for ItemId {}

#[derive(Debug, Default, Deserialize, Serialize)]
struct Item {
    name: String,
    email: String,
}

impl Validate for Item {
    fn validate(&self, v: &mut Violations) {
        v.required("name", &self.name);
        v.email("email", &self.email);
    }
}

/// Binds all three groups and records how far binding got.
struct UpdateItem {
    query: Search,
    params: ItemId,
    body: Item,
    reached: Arc<AtomicUsize>,
}

impl Handler for UpdateItem {
    fn query(&mut self) -> Option<&mut dyn Input> {
        self.reached.fetch_add(1, Ordering::SeqCst);
        Some(&mut self.query)
    }

    fn url_params(&mut self) -> Option<&mut dyn Input> {
        self.reached.fetch_add(1, Ordering::SeqCst);
        Some(&mut self.params)
    }

    fn body(&mut self) -> Option<&mut dyn Payload> {
        self.reached.fetch_add(1, Ordering::SeqCst);
        Some(&mut self.body)
    }

    async fn handle(self, cx: Context) -> Result<(), Error> {
        cx.write_json(StatusCode::OK, &json!({ "id": self.params.id, "item": self.body }))
    }
}

#[derive(Default)]
struct CreateItem {
    body: Item,
}

impl Handler for CreateItem {
    fn body(&mut self) -> Option<&mut dyn Payload> { Some(&mut self.body) }

    async fn handle(self, cx: Context) -> Result<(), Error> {
        cx.write_json(StatusCode::CREATED, &self.body)
    }
}

struct Explode;

impl Handler for Explode {
    async fn handle(self, _cx: Context) -> Result<(), Error> {
        panic!("kaboom")
    }
}

fn app() -> Router {
    Router::new()
        .get("/items", |_cx| Ok(ListItems::default()))
        .post("/items", |_cx| Ok(CreateItem::default()))
        .get("/explode", |_cx| Ok(Explode))
}

// ── Binding ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn query_scalars_and_sequences_are_bound() {
    let res = app().respond(get("/items?name=foo&tag=a&tag=b")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(json_of(&res), json!({ "name": "foo", "tags": ["a", "b"], "limit": 10 }));
}

#[tokio::test]
async fn absent_and_empty_values_keep_provider_defaults() {
    let res = app().respond(get("/items?name=&limit=")).await;
    assert_eq!(json_of(&res), json!({ "name": "anyone", "tags": [], "limit": 10 }));
}

#[tokio::test]
async fn invalid_query_is_a_400_with_query_errors() {
    let res = app().respond(get("/items?limit=500")).await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_of(&res),
        json!({ "errors": { "query": ["limit must be between 1 and 50"] } })
    );
}

#[tokio::test]
async fn url_param_type_mismatch_is_reported_under_urlparams() {
    let reached = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&reached);
    let app = Router::new().put("/items/{id}", move |_cx| {
        Ok(UpdateItem {
            query: Search::default(),
            params: ItemId::default(),
            body: Item::default(),
            reached: Arc::clone(&counter),
        })
    });

    let req = http::Request::builder()
        .method(Method::PUT)
        .uri("/items/abc")
        .header("content-type", "application/json")
        .body(Bytes::from_static(br#"{"name":"x"}"#))
        .unwrap();
    let res = app.respond(req).await;

    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    let body = json_of(&res);
    let messages = body["errors"]["urlparams"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].as_str().unwrap().starts_with("id: cannot use \"abc\""));
    // Body binding never started.
    assert_eq!(reached.load(Ordering::SeqCst), 2);
}

#[derive(Default)]
struct UserName {
    name: String,
}

members!(UserName { name: scalar });

impl Validate for UserName {}

#[derive(Default)]
struct GetUser {
    params: UserName,
}

impl Handler for GetUser {
    fn url_params(&mut self) -> Option<&mut dyn Input> { Some(&mut self.params) }

    async fn handle(self, cx: Context) -> Result<(), Error> {
        cx.write_text(StatusCode::OK, self.params.name)
    }
}

#[tokio::test]
async fn url_params_are_percent_decoded() {
    let app = Router::new().get("/users/{name}", |_cx| Ok(GetUser::default()));
    let res = app.respond(get("/users/john%20doe")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.body(), b"john doe");
}

#[tokio::test]
async fn undecodable_url_param_is_a_urlparams_error() {
    let app = Router::new().get("/users/{name}", |_cx| Ok(GetUser::default()));
    let res = app.respond(get("/users/%FF%FE")).await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    let body = json_of(&res);
    let messages = body["errors"]["urlparams"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].as_str().unwrap().starts_with("name: cannot decode"));
}

#[tokio::test]
async fn query_failure_stops_the_remaining_groups() {
    let reached = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&reached);
    let app = Router::new().put("/items/{id}", move |_cx| {
        Ok(UpdateItem {
            query: Search::default(),
            params: ItemId::default(),
            body: Item::default(),
            reached: Arc::clone(&counter),
        })
    });

    let req = http::Request::builder()
        .method(Method::PUT)
        .uri("/items/7?limit=0")
        .body(Bytes::new())
        .unwrap();
    let res = app.respond(req).await;

    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    assert!(json_of(&res)["errors"]["query"].is_array());
    assert_eq!(reached.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn all_groups_bind_in_one_request() {
    let app = Router::new().put("/items/{id}", |_cx| {
        Ok(UpdateItem {
            query: Search::default(),
            params: ItemId::default(),
            body: Item::default(),
            reached: Arc::default(),
        })
    });
    let req = http::Request::builder()
        .method(Method::PUT)
        .uri("/items/7")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Bytes::from_static(b"name=lamp&email=a%40b.io"))
        .unwrap();
    let res = app.respond(req).await;

    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(json_of(&res), json!({ "id": 7, "item": { "name": "lamp", "email": "a@b.io" } }));
}

// ── Body ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn json_body_is_bound_and_validated() {
    let res = app()
        .respond(post("/items", Some("application/json"), r#"{"name":"lamp","email":""}"#))
        .await;
    assert_eq!(res.status_code(), StatusCode::CREATED);
    assert_eq!(json_of(&res), json!({ "name": "lamp", "email": "" }));
}

#[tokio::test]
async fn every_body_violation_is_reported() {
    let res = app()
        .respond(post("/items", Some("application/json"), r#"{"name":" ","email":"nope"}"#))
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_of(&res),
        json!({ "errors": { "body": [
            "name is required",
            "email must be a valid email address",
        ] } })
    );
}

#[tokio::test]
async fn missing_and_unknown_content_types_are_distinct_400s() {
    let missing = app().respond(post("/items", None, "name=x")).await;
    let unknown = app().respond(post("/items", Some("text/plain"), "name=x")).await;

    assert_eq!(missing.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(unknown.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(json_of(&missing), json!({ "error": "content-type header was not set on the request" }));
    assert_eq!(json_of(&unknown), json!({ "error": "unknown content type: \"text/plain\"" }));
}

#[tokio::test]
async fn malformed_body_is_a_body_validation_error() {
    let res = app().respond(post("/items", Some("application/json"), "{")).await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(json_of(&res)["errors"]["body"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn multipart_fields_are_bound() {
    let body = "--xyz\r\n\
        Content-Disposition: form-data; name=\"name\"\r\n\r\n\
        lamp\r\n\
        --xyz\r\n\
        Content-Disposition: form-data; name=\"email\"\r\n\r\n\
        a@b.io\r\n\
        --xyz--\r\n";
    let res = app()
        .respond(post("/items", Some("multipart/form-data; boundary=xyz"), body))
        .await;
    assert_eq!(res.status_code(), StatusCode::CREATED);
    assert_eq!(json_of(&res), json!({ "name": "lamp", "email": "a@b.io" }));
}

#[tokio::test]
async fn multipart_value_may_contain_the_boundary_text() {
    let body = "--xyz\r\n\
        Content-Disposition: form-data; name=\"name\"\r\n\r\n\
        a--xyzb\r\n\
        --xyz--\r\n";
    let res = app()
        .respond(post("/items", Some("multipart/form-data; boundary=xyz"), body))
        .await;
    assert_eq!(res.status_code(), StatusCode::CREATED);
    assert_eq!(json_of(&res)["name"], "a--xyzb");
}

#[tokio::test]
async fn multipart_over_the_memory_limit_is_rejected() {
    let big = "x".repeat(256);
    let body = format!(
        "--xyz\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\n{big}\r\n--xyz--\r\n"
    );
    let app = app().config(Config::default().with_multipart_max_memory(64));
    let res = app
        .respond(post("/items", Some("multipart/form-data; boundary=xyz"), &body))
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    assert!(json_of(&res)["errors"]["body"].is_array());
}

// ── Panics and providers ──────────────────────────────────────────────────────

#[tokio::test]
async fn panic_is_a_500_and_the_router_keeps_serving() {
    let app = app();
    let res = app.respond(get("/explode")).await;
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_of(&res), json!({ "error": "kaboom" }));

    let next = app.respond(get("/items")).await;
    assert_eq!(next.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn provider_returning_no_handler_is_a_500() {
    let app = Router::new().get("/none", |_cx| Ok(None::<ListItems>));
    let res = app.respond(get("/none")).await;
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json_of(&res),
        json!({ "error": "handler provider returned no handler for GET /none" })
    );
}

#[tokio::test]
async fn provider_error_short_circuits() {
    let app = Router::new().get("/secret", |cx: &Context| {
        if cx.header("x-api-key").is_none() {
            return Err(Error::unauthorized());
        }
        Ok(ListItems::default())
    });
    let res = app.respond(get("/secret")).await;
    assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_of(&res), json!({ "error": "Unauthorized" }));
}

#[tokio::test]
async fn each_request_gets_a_fresh_handler() {
    let first = app().respond(get("/items?tag=a")).await;
    assert_eq!(json_of(&first)["tags"], json!(["a"]));

    let app = app();
    app.respond(get("/items?tag=a&tag=b")).await;
    let again = app.respond(get("/items")).await;
    assert_eq!(json_of(&again)["tags"], json!([]));
}

// ── Middleware and dispatch ───────────────────────────────────────────────────

#[tokio::test]
async fn every_middleware_observes_the_error_and_one_response_is_written() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let observer = |name: &'static str| {
        let seen = Arc::clone(&seen);
        middleware::from_fn(move |cx, next| {
            let seen = Arc::clone(&seen);
            async move {
                let result = next(cx.clone()).await;
                if let Err(e) = &result {
                    // Dispatch already ran one layer in.
                    seen.lock().unwrap().push((name, e.status(), cx.written()));
                }
                result
            }
        })
    };
    let writes = Arc::new(AtomicUsize::new(0));
    let counting = {
        let writes = Arc::clone(&writes);
        move |cx: &Context, err: &Error| {
            if !cx.written() {
                writes.fetch_add(1, Ordering::SeqCst);
            }
            tusk::dispatch::dispatch(cx, err);
        }
    };

    let app = app().layer(observer("m1")).layer(observer("m2")).error_handler(counting);
    let res = app.respond(get("/items?limit=0")).await;

    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(
        *seen.lock().unwrap(),
        [("m2", StatusCode::BAD_REQUEST, true), ("m1", StatusCode::BAD_REQUEST, true)]
    );
    assert_eq!(writes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn handler_response_is_not_overwritten_by_a_later_error() {
    async fn partial(cx: Context) -> Result<(), Error> {
        cx.write_status(StatusCode::ACCEPTED)?;
        Err(Error::other("background step failed"))
    }

    let app = Router::new().get_fn("/partial", partial);
    let res = app.respond(get("/partial")).await;
    assert_eq!(res.status_code(), StatusCode::ACCEPTED);
    assert!(res.body().is_empty());
}

#[tokio::test]
async fn handler_that_writes_nothing_is_an_empty_200() {
    let app = Router::new().get_fn("/quiet", |_cx| async { Ok(()) });
    let res = app.respond(get("/quiet")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert!(res.body().is_empty());
}

#[tokio::test]
async fn trace_middleware_leaves_the_response_alone() {
    let app = app().layer(middleware::trace());
    let res = app.respond(get("/items?name=t")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(json_of(&res)["name"], "t");
}
