//! Per-request context: the request view and the single-shot response slot.
//!
//! A [`Context`] is a cheap handle (one `Arc`) that every middleware layer and
//! the handler receive. Cloning it does not copy the request. The response
//! slot records whether anything has been written; the first write wins and
//! every later write is refused, which is what lets several layers dispatch
//! the same error without the client seeing more than one response.

use std::borrow::Cow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode, Uri};
use serde::Serialize;

use crate::error::Error;
use crate::response::Response;

/// Handle to one in-flight request.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    params: Vec<(String, String)>,
    undecodable: Vec<String>,
    query: Vec<(String, String)>,
    response: Mutex<Option<Response>>,
}

impl Context {
    pub(crate) fn new(req: http::Request<Bytes>, params: Vec<(String, String)>) -> Self {
        let (parts, body) = req.into_parts();
        let query = parts
            .uri
            .query()
            .and_then(|q| serde_urlencoded::from_str(q).ok())
            .unwrap_or_default();
        let (params, undecodable) = decode_params(params);
        Self {
            inner: Arc::new(Inner {
                method: parts.method,
                uri: parts.uri,
                headers: parts.headers,
                body,
                params,
                undecodable,
                query,
                response: Mutex::new(None),
            }),
        }
    }

    pub fn method(&self) -> &Method { &self.inner.method }
    pub fn uri(&self) -> &Uri { &self.inner.uri }
    pub fn path(&self) -> &str { self.inner.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.inner.headers }
    pub fn body(&self) -> &[u8] { &self.inner.body }

    /// Header value as text. `None` when absent or not visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(http::header::CONTENT_TYPE.as_str())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `cx.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.inner.params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Matched path variables, percent-decoded, in pattern order.
    pub fn params(&self) -> &[(String, String)] { &self.inner.params }

    /// One message per path variable that is not UTF-8 once decoded. Those
    /// variables keep their raw text in [`params`](Self::params).
    pub(crate) fn undecodable_params(&self) -> &[String] { &self.inner.undecodable }

    /// Decoded query string pairs, in request order. Repeated keys repeat.
    pub fn query_pairs(&self) -> &[(String, String)] { &self.inner.query }

    // ── Response slot ─────────────────────────────────────────────────────────

    /// Stores the response for this request. Fails if one was already stored.
    pub fn write(&self, response: Response) -> Result<(), Error> {
        let mut slot = self.slot();
        if slot.is_some() {
            return Err(Error::config(format!(
                "response for {} {} was already written",
                self.method(),
                self.path()
            )));
        }
        *slot = Some(response);
        Ok(())
    }

    /// Serialises `value` and writes it as `application/json`.
    pub fn write_json<T: Serialize + ?Sized>(&self, status: StatusCode, value: &T) -> Result<(), Error> {
        let body = serde_json::to_vec(value).map_err(Error::other)?;
        self.write(Response::builder().status(status).json(body))
    }

    pub fn write_text(&self, status: StatusCode, body: impl Into<String>) -> Result<(), Error> {
        self.write(Response::builder().status(status).text(body))
    }

    /// Writes a body-less response, e.g. `204 No Content`.
    pub fn write_status(&self, status: StatusCode) -> Result<(), Error> {
        self.write(Response::status(status))
    }

    /// Whether a response has been written.
    pub fn written(&self) -> bool {
        self.slot().is_some()
    }

    /// Status of the written response, if any.
    pub fn response_status(&self) -> Option<StatusCode> {
        self.slot().as_ref().map(Response::status_code)
    }

    /// Takes the written response, or an empty `200 OK` when the handler
    /// finished without writing.
    pub(crate) fn finish(&self) -> Response {
        self.slot().take().unwrap_or_else(|| Response::status(StatusCode::OK))
    }

    fn slot(&self) -> MutexGuard<'_, Option<Response>> {
        self.inner.response.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn decode_params(raw: Vec<(String, String)>) -> (Vec<(String, String)>, Vec<String>) {
    let mut undecodable = Vec::new();
    let params = raw
        .into_iter()
        .map(|(key, value)| {
            let decoded = match urlencoding::decode(&value).map(Cow::into_owned) {
                Ok(decoded) => decoded,
                Err(e) => {
                    undecodable.push(format!("{key}: cannot decode {value:?}: {e}"));
                    value
                }
            };
            (key, decoded)
        })
        .collect();
    (params, undecodable)
}

#[cfg(test)]
pub(crate) fn test_context(uri: &str, params: &[(&str, &str)]) -> Context {
    let req = http::Request::builder().uri(uri).body(Bytes::new()).unwrap();
    let params = params.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    Context::new(req, params)
}
