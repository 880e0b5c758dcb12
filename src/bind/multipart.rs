//! Bounded `multipart/form-data` field decoding.
//!
//! Only the text fields of a form are decoded; file parts are skipped. The
//! decoded bytes are capped by the configured in-memory threshold and a body
//! that exceeds it is rejected outright.

use std::collections::HashMap;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MultipartError {
    #[error("missing boundary in multipart content type")]
    MissingBoundary,
    #[error("unexpected end of multipart body")]
    UnexpectedEof,
    #[error("malformed multipart body: {0}")]
    Malformed(&'static str),
    #[error("multipart part is missing a name")]
    MissingName,
    #[error("multipart form exceeds the {max} byte in-memory limit")]
    TooLarge { max: usize },
}

/// Extracts the boundary parameter from a `multipart/form-data` content type.
pub(crate) fn boundary(content_type: &str) -> Result<&str, MultipartError> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"'))
        .filter(|b| !b.is_empty())
        .ok_or(MultipartError::MissingBoundary)
}

/// Decodes the text fields of `body`, in order.
pub(crate) fn fields(
    content_type: &str,
    body: &[u8],
    max_memory: usize,
) -> Result<Vec<(String, String)>, MultipartError> {
    let delimiter = format!("--{}", boundary(content_type)?).into_bytes();
    // Inside the body a delimiter always starts a line.
    let line_delimiter = [b"\r\n".as_slice(), delimiter.as_slice()].concat();
    let mut fields = Vec::new();
    let mut used = 0usize;

    let mut pos = if body.starts_with(&delimiter) {
        0
    } else {
        find(body, &line_delimiter, 0).ok_or(MultipartError::UnexpectedEof)? + 2
    };
    loop {
        pos += delimiter.len();
        if body[pos..].starts_with(b"--") {
            return Ok(fields);
        }
        if !body[pos..].starts_with(b"\r\n") {
            return Err(MultipartError::Malformed("expected CRLF after boundary"));
        }
        pos += 2;

        let header_end = find(body, b"\r\n\r\n", pos).ok_or(MultipartError::UnexpectedEof)?;
        let headers = part_headers(&body[pos..header_end])?;
        pos = header_end + 4;

        let next = find(body, &line_delimiter, header_end).ok_or(MultipartError::UnexpectedEof)?;
        let data = body.get(pos..next).unwrap_or_default();
        pos = next + 2;

        let disposition = headers
            .get("content-disposition")
            .ok_or(MultipartError::Malformed("part without content-disposition"))?;
        let (name, is_file) = disposition_name(disposition)?;
        if is_file {
            continue;
        }

        used += name.len() + data.len();
        if used > max_memory {
            return Err(MultipartError::TooLarge { max: max_memory });
        }
        fields.push((name, String::from_utf8_lossy(data).into_owned()));
    }
}

fn part_headers(raw: &[u8]) -> Result<HashMap<String, String>, MultipartError> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| MultipartError::Malformed("part headers are not UTF-8"))?;
    Ok(text
        .split("\r\n")
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_owned()))
        .collect())
}

/// `form-data; name="field"; filename="a.txt"` → `("field", true)`.
fn disposition_name(value: &str) -> Result<(String, bool), MultipartError> {
    let mut name = None;
    let mut is_file = false;
    for param in value.split(';').skip(1) {
        let Some((key, val)) = param.trim().split_once('=') else { continue };
        let val = val.trim().trim_matches('"');
        if key.eq_ignore_ascii_case("name") {
            name = Some(val.to_owned());
        } else if key.eq_ignore_ascii_case("filename") {
            is_file = true;
        }
    }
    name.map(|n| (n, is_file)).ok_or(MultipartError::MissingName)
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack.get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}
