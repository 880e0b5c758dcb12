//! Request-body decoding, selected strictly by the declared content type.
//!
//! | Content type | Decoder |
//! |---|---|
//! | `application/json` | `serde_json` |
//! | `application/x-www-form-urlencoded` | `serde_urlencoded` |
//! | `multipart/form-data; boundary=…` | bounded field decoder, then `serde_urlencoded` |
//!
//! Anything else, or no content type at all, is a 400.

use std::borrow::Cow;

use http::StatusCode;
use serde::de::DeserializeOwned;

use super::multipart::{self, MultipartError};
use crate::error::Error;
use crate::validate::Validate;

const JSON: &str = "application/json";
const FORM: &str = "application/x-www-form-urlencoded";
const MULTIPART: &str = "multipart/form-data";

/// A request body paired with the decoder its content type selected.
#[derive(Debug)]
pub enum Encoded<'a> {
    Json(&'a [u8]),
    /// URL-encoded pairs. Multipart fields are re-encoded into this form.
    Form(Cow<'a, [u8]>),
}

/// Body-binding capability: a value that can be replaced by a decoded body.
///
/// Implemented for every `DeserializeOwned + Validate` type; you do not
/// implement it by hand.
pub trait Payload: Validate + Send {
    fn decode(&mut self, encoded: Encoded<'_>) -> Result<(), DecodeError>;
}

impl<T> Payload for T
where
    T: DeserializeOwned + Validate + Send,
{
    fn decode(&mut self, encoded: Encoded<'_>) -> Result<(), DecodeError> {
        *self = match encoded {
            Encoded::Json(bytes) => serde_json::from_slice(bytes)?,
            Encoded::Form(bytes) => serde_urlencoded::from_bytes(&bytes)?,
        };
        Ok(())
    }
}

/// Why a body could not be decoded. Reported as a `Body` validation failure.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Form(#[from] serde_urlencoded::de::Error),
    #[error("{0}")]
    Multipart(#[from] MultipartError),
    #[error("{0}")]
    Reencode(#[from] serde_urlencoded::ser::Error),
}

/// Picks the decoder for `content_type`.
///
/// The outer `Err` is a 400 status error (no decoder can be chosen); the
/// inner one is a decode failure of the chosen multipart decoder.
pub(crate) fn select<'a>(
    content_type: Option<&str>,
    body: &'a [u8],
    multipart_max_memory: usize,
) -> Result<Result<Encoded<'a>, DecodeError>, Error> {
    let Some(content_type) = content_type else {
        return Err(Error::new(
            StatusCode::BAD_REQUEST,
            "content-type header was not set on the request",
        ));
    };

    let media_type = content_type.split(';').next().unwrap_or_default().trim();
    if media_type.eq_ignore_ascii_case(JSON) {
        Ok(Ok(Encoded::Json(body)))
    } else if media_type.eq_ignore_ascii_case(FORM) {
        Ok(Ok(Encoded::Form(Cow::Borrowed(body))))
    } else if media_type.to_ascii_lowercase().starts_with(MULTIPART) {
        Ok(multipart_form(content_type, body, multipart_max_memory))
    } else {
        Err(Error::new(
            StatusCode::BAD_REQUEST,
            format!("unknown content type: {content_type:?}"),
        ))
    }
}

fn multipart_form(
    content_type: &str,
    body: &[u8],
    max_memory: usize,
) -> Result<Encoded<'static>, DecodeError> {
    let fields = multipart::fields(content_type, body, max_memory)?;
    let encoded = serde_urlencoded::to_string(&fields)?;
    Ok(Encoded::Form(Cow::Owned(encoded.into_bytes())))
}
