//! Unified error type.
//!
//! Every failure the pipeline can surface is one variant of [`Error`]. The
//! dispatcher matches on it exactly once to pick the status and the client
//! payload:
//!
//! | Variant | Status | Client body |
//! |---|---|---|
//! | [`Error::Status`] | caller-chosen | `{"error": "<cause>"}` |
//! | [`Error::Validation`] | 400 | `{"errors": {"<group>": ["<msg>", …]}}` |
//! | [`Error::Panic`] | 500 | `{"error": "<cause>"}` (never the trace) |
//! | [`Error::Config`] | 500 | `{"error": "<message>"}` |
//! | [`Error::Other`] | 500 | `{"error": "<message>"}` |

use std::any::Any;
use std::collections::BTreeMap;
use std::error::Error as StdError;

use http::StatusCode;
use serde::{Serialize, Serializer};

use crate::bind::Group;

/// A boxed, thread-safe error from application code or a decoder.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// The error type returned by handlers, middleware and the binder.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An explicit HTTP status with a client-visible cause.
    #[error("{cause}")]
    Status { status: StatusCode, cause: String },

    /// Bad client input: a binding or constraint failure inside one group.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A panic recovered at the innermost invocation point.
    #[error(transparent)]
    Panic(#[from] PanicError),

    /// A developer mistake detected at request time, such as a provider that
    /// produced no handler.
    #[error("configuration fault: {0}")]
    Config(String),

    /// Anything else. Reported to the client as a 500.
    #[error("{0}")]
    Other(#[source] BoxError),
}

impl Error {
    /// An error with `status` and a custom client-visible cause.
    pub fn new(status: StatusCode, cause: impl Into<String>) -> Self {
        Self::Status { status, cause: cause.into() }
    }

    /// An error with `status` whose cause is the canonical reason phrase,
    /// e.g. `"Forbidden"`.
    pub fn from_status(status: StatusCode) -> Self {
        let cause = status.canonical_reason().unwrap_or("Unknown Status");
        Self::new(status, cause)
    }

    pub fn unauthorized() -> Self { Self::from_status(StatusCode::UNAUTHORIZED) }
    pub fn forbidden() -> Self { Self::from_status(StatusCode::FORBIDDEN) }
    pub fn not_found() -> Self { Self::from_status(StatusCode::NOT_FOUND) }
    pub fn not_acceptable() -> Self { Self::from_status(StatusCode::NOT_ACCEPTABLE) }
    pub fn unsupported_media_type() -> Self { Self::from_status(StatusCode::UNSUPPORTED_MEDIA_TYPE) }
    pub fn gone() -> Self { Self::from_status(StatusCode::GONE) }
    pub fn too_many_requests() -> Self { Self::from_status(StatusCode::TOO_MANY_REQUESTS) }

    /// A 404 that tells the client the route was right but the record is
    /// missing, as opposed to a bare "Not Found" for an unknown path.
    pub fn entity_not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "entity not found")
    }

    /// Wraps an arbitrary error. Dispatched as a 500.
    pub fn other(err: impl Into<BoxError>) -> Self {
        Self::Other(err.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// The status the dispatcher writes for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Status { status, .. } => *status,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Panic(_) | Self::Config(_) | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_validation(&self) -> bool { matches!(self, Self::Validation(_)) }
    pub fn is_panic(&self) -> bool { matches!(self, Self::Panic(_)) }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Other(Box::new(e))
    }
}

#[derive(Serialize)]
struct Single<'a> {
    error: &'a str,
}

/// The client payload. Server-side detail (panic traces, source chains) is
/// never part of it.
impl Serialize for Error {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Status { cause, .. } => Single { error: cause }.serialize(serializer),
            Self::Validation(v) => v.serialize(serializer),
            Self::Panic(p) => Single { error: &p.cause.to_string() }.serialize(serializer),
            Self::Config(message) => Single { error: message }.serialize(serializer),
            Self::Other(e) => Single { error: &e.to_string() }.serialize(serializer),
        }
    }
}

// ── ValidationError ───────────────────────────────────────────────────────────

/// Every violated rule of one group, in the order they were found.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", .messages.join("; "))]
pub struct ValidationError {
    group: Group,
    messages: Vec<String>,
}

impl ValidationError {
    pub fn new(group: Group, messages: Vec<String>) -> Self {
        Self { group, messages }
    }

    pub fn single(group: Group, message: impl Into<String>) -> Self {
        Self::new(group, vec![message.into()])
    }

    pub fn group(&self) -> Group { self.group }
    pub fn messages(&self) -> &[String] { &self.messages }
}

impl Serialize for ValidationError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Errors<'a> {
            errors: BTreeMap<&'static str, &'a [String]>,
        }

        let errors = BTreeMap::from([(self.group.key(), self.messages.as_slice())]);
        Errors { errors }.serialize(serializer)
    }
}

// ── PanicError ────────────────────────────────────────────────────────────────

/// A recovered panic: its cause plus the backtrace taken where it was raised.
#[derive(Debug, thiserror::Error)]
#[error("{cause}\n{trace}")]
pub struct PanicError {
    cause: BoxError,
    trace: String,
}

impl PanicError {
    /// Builds the error from a `catch_unwind` payload. A payload that is
    /// already an error value becomes the cause as-is; anything else is
    /// formatted as text.
    pub fn new(payload: Box<dyn Any + Send>, trace: impl Into<String>) -> Self {
        let cause: BoxError = match payload.downcast::<Error>() {
            Ok(err) => err,
            Err(payload) => match payload.downcast::<BoxError>() {
                Ok(err) => *err,
                Err(payload) => panic_message(payload.as_ref()).into(),
            },
        };
        Self { cause, trace: trace.into() }
    }

    pub fn cause(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.cause.as_ref()
    }

    pub fn trace(&self) -> &str { &self.trace }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
