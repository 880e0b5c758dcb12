//! Field binding: query string, path variables and body into a handler.
//!
//! A handler opts into each input class through a capability accessor on
//! [`Handler`]. A class it does not expose is simply never read:
//!
//! | Group | Accessor | Source |
//! |---|---|---|
//! | `Query` | [`Handler::query`] | query string pairs |
//! | `URLParams` | [`Handler::url_params`] | matched path variables |
//! | `Body` | [`Handler::body`] | decoded request body |
//!
//! Groups are bound in that order and each is validated immediately after
//! it is bound. The first failure stops the sequence: a rejected `Query`
//! means the path variables and the body are never touched.
//!
//! Query and path members are set one at a time through a [`Source`], so
//! anything the request does not mention keeps the value the provider gave
//! it. The [`members!`](crate::members) macro writes that impl:
//!
//! ```rust
//! use tusk::members;
//! use tusk::validate::Validate;
//!
//! #[derive(Default)]
//! struct Search {
//!     name: String,
//!     tags: Vec<String>,
//!     page: Option<u32>,
//!     cursor: String,
//! }
//!
//! members!(Search {
//!     name: scalar,
//!     tags as "tag": sequence,
//!     page: optional,
//!     cursor as "-": scalar,   // never bound
//! });
//!
//! impl Validate for Search {}
//! ```

mod body;
pub mod multipart;

use std::any::type_name;
use std::fmt;
use std::str::FromStr;

pub use body::{DecodeError, Encoded, Payload};

use crate::config::Config;
use crate::context::Context;
use crate::error::{Error, ValidationError};
use crate::handler::Handler;
use crate::validate::{self, Validate};

/// Source key that marks a member as never bound.
pub const IGNORE: &str = "-";

/// The three input classes, in binding order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Group {
    Query,
    UrlParams,
    Body,
}

impl Group {
    /// The reserved, case-sensitive name: `Query`, `URLParams`, `Body`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Query     => "Query",
            Self::UrlParams => "URLParams",
            Self::Body      => "Body",
        }
    }

    /// The lower-cased name used as the key in validation payloads.
    pub fn key(self) -> &'static str {
        match self {
            Self::Query     => "query",
            Self::UrlParams => "urlparams",
            Self::Body      => "body",
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Member binding ────────────────────────────────────────────────────────────

/// A raw value that could not be converted into its member's type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{key}: cannot use {value:?} as {expected}: {reason}")]
pub struct TypeMismatch {
    pub key: String,
    pub value: String,
    pub expected: &'static str,
    pub reason: String,
}

/// Query / path binding capability. Usually written with [`members!`](crate::members).
pub trait Members {
    fn bind_members(&mut self, source: &Source<'_>) -> Result<(), TypeMismatch>;
}

/// What [`Handler::query`] and [`Handler::url_params`] hand out.
pub trait Input: Members + Validate + Send {}

impl<T: Members + Validate + Send> Input for T {}

/// Ordered key/value pairs one group is bound from.
///
/// Every setter resolves values by key, skips the [`IGNORE`] key, and leaves
/// the member untouched when the request carries nothing for it.
pub struct Source<'a> {
    pairs: &'a [(String, String)],
}

impl<'a> Source<'a> {
    pub fn new(pairs: &'a [(String, String)]) -> Self {
        Self { pairs }
    }

    fn values(&self, key: &str) -> impl Iterator<Item = &'a str> {
        self.pairs.iter().filter(move |(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    fn first(&self, key: &str) -> Option<&'a str> {
        if key == IGNORE {
            return None;
        }
        self.values(key).next().filter(|v| !v.is_empty())
    }

    /// First value under `key`. An empty value counts as absent.
    pub fn scalar<T>(&self, key: &str, member: &mut T) -> Result<(), TypeMismatch>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        if let Some(raw) = self.first(key) {
            *member = parse(key, raw)?;
        }
        Ok(())
    }

    /// Like [`scalar`](Self::scalar), storing `Some(value)`.
    pub fn optional<T>(&self, key: &str, member: &mut Option<T>) -> Result<(), TypeMismatch>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        if let Some(raw) = self.first(key) {
            *member = Some(parse(key, raw)?);
        }
        Ok(())
    }

    /// Every value under `key`, in request order. Only growable sequences
    /// bind; fixed-size arrays have no setter.
    pub fn sequence<T>(&self, key: &str, member: &mut Vec<T>) -> Result<(), TypeMismatch>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        if key == IGNORE {
            return Ok(());
        }
        let values = self
            .values(key)
            .map(|raw| parse(key, raw))
            .collect::<Result<Vec<T>, _>>()?;
        if !values.is_empty() {
            *member = values;
        }
        Ok(())
    }
}

fn parse<T>(key: &str, raw: &str) -> Result<T, TypeMismatch>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.parse().map_err(|e: T::Err| TypeMismatch {
        key: key.to_owned(),
        value: raw.to_owned(),
        expected: type_name::<T>(),
        reason: e.to_string(),
    })
}

/// Implements [`Members`] for a struct.
///
/// Each entry is `member: kind` or `member as "key": kind`, where `kind` is
/// one of `scalar`, `optional`, `sequence`. Without `as`, the source key is
/// the member's own name; `as "-"` leaves the member unbound.
#[macro_export]
macro_rules! members {
    (@key $member:ident $key:literal) => { $key };
    (@key $member:ident) => { stringify!($member) };
    ($ty:ty { $($member:ident $(as $key:literal)? : $kind:ident),* $(,)? }) => {
        impl $crate::bind::Members for $ty {
            #[allow(unused_variables)]
            fn bind_members(
                &mut self,
                source: &$crate::bind::Source<'_>,
            ) -> ::std::result::Result<(), $crate::bind::TypeMismatch> {
                $( source.$kind($crate::members!(@key $member $($key)?), &mut self.$member)?; )*
                ::std::result::Result::Ok(())
            }
        }
    };
}

// ── Binder ────────────────────────────────────────────────────────────────────

/// Binds and validates a handler's groups for one request.
#[derive(Debug, Clone)]
pub struct Binder {
    multipart_max_memory: usize,
}

impl Binder {
    pub fn new(config: &Config) -> Self {
        Self { multipart_max_memory: config.multipart_max_memory() }
    }

    /// Query, then path variables, then body; each validated before the next
    /// is read.
    pub fn bind<H: Handler>(&self, handler: &mut H, cx: &Context) -> Result<(), Error> {
        if let Some(query) = handler.query() {
            bind_group(Group::Query, query, &Source::new(cx.query_pairs()))?;
        }
        if let Some(params) = handler.url_params() {
            if !cx.undecodable_params().is_empty() {
                let messages = cx.undecodable_params().to_vec();
                return Err(ValidationError::new(Group::UrlParams, messages).into());
            }
            bind_group(Group::UrlParams, params, &Source::new(cx.params()))?;
        }
        if let Some(body) = handler.body() {
            self.bind_body(body, cx)?;
        }
        Ok(())
    }

    fn bind_body(&self, target: &mut dyn Payload, cx: &Context) -> Result<(), Error> {
        body::select(cx.content_type(), cx.body(), self.multipart_max_memory)?
            .and_then(|encoded| target.decode(encoded))
            .map_err(|e| ValidationError::single(Group::Body, e.to_string()))?;
        validate::validate(Group::Body, &*target)?;
        Ok(())
    }
}

fn bind_group(group: Group, target: &mut dyn Input, source: &Source<'_>) -> Result<(), Error> {
    target
        .bind_members(source)
        .map_err(|e| ValidationError::single(group, e.to_string()))?;
    validate::validate(group, &*target)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Listing {
        name: String,
        tags: Vec<String>,
        limit: u32,
        page: Option<u32>,
        secret: String,
    }

    crate::members!(Listing {
        name: scalar,
        tags as "tag": sequence,
        limit: scalar,
        page: optional,
        secret as "-": scalar,
    });

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn defaults() -> Listing {
        Listing { limit: 25, secret: "keep".into(), ..Listing::default() }
    }

    #[test]
    fn scalars_take_first_and_sequences_keep_order() {
        let raw = pairs(&[("name", "foo"), ("tag", "a"), ("name", "bar"), ("tag", "b")]);
        let mut listing = defaults();
        listing.bind_members(&Source::new(&raw)).unwrap();
        assert_eq!(listing.name, "foo");
        assert_eq!(listing.tags, ["a", "b"]);
    }

    #[test]
    fn absent_and_empty_values_keep_defaults() {
        let raw = pairs(&[("limit", ""), ("page", "")]);
        let mut listing = defaults();
        listing.tags = vec!["pre".into()];
        listing.bind_members(&Source::new(&raw)).unwrap();
        assert_eq!(listing.limit, 25);
        assert_eq!(listing.page, None);
        assert_eq!(listing.tags, ["pre"]);
    }

    #[test]
    fn ignored_member_is_never_bound() {
        let raw = pairs(&[("secret", "leak"), ("-", "leak")]);
        let mut listing = defaults();
        listing.bind_members(&Source::new(&raw)).unwrap();
        assert_eq!(listing.secret, "keep");
    }

    #[test]
    fn optional_member_is_set() {
        let raw = pairs(&[("page", "3")]);
        let mut listing = defaults();
        listing.bind_members(&Source::new(&raw)).unwrap();
        assert_eq!(listing.page, Some(3));
    }

    #[test]
    fn type_mismatch_names_the_key() {
        let raw = pairs(&[("limit", "ten")]);
        let mut listing = defaults();
        let err = listing.bind_members(&Source::new(&raw)).unwrap_err();
        assert_eq!(err.key, "limit");
        assert_eq!(err.value, "ten");
        assert_eq!(err.expected, "u32");
        assert!(err.to_string().starts_with("limit: cannot use \"ten\" as u32"));
    }

    #[test]
    fn group_names() {
        assert_eq!(Group::UrlParams.name(), "URLParams");
        assert_eq!(Group::UrlParams.key(), "urlparams");
        assert_eq!(Group::Query.to_string(), "Query");
    }
}
