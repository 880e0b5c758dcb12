//! Declarative constraint checks for bound input.
//!
//! A bound sub-structure implements [`Validate`] and reports every violated
//! rule into a [`Violations`] collector. The collector never short-circuits:
//! two failing members of one group produce one error with two messages.
//!
//! ```rust
//! use tusk::validate::{Validate, Violations};
//!
//! struct Signup {
//!     email: String,
//!     age: u32,
//! }
//!
//! impl Validate for Signup {
//!     fn validate(&self, v: &mut Violations) {
//!         v.email("email", &self.email);
//!         v.range("age", self.age, 13, 130);
//!     }
//! }
//! ```

use std::fmt::Display;

use crate::bind::Group;
use crate::error::ValidationError;

/// Constraint rules for a bound value.
///
/// The default implementation accepts everything, so input types without
/// rules only need an empty `impl Validate for T {}`.
pub trait Validate {
    fn validate(&self, _violations: &mut Violations) {}
}

/// Ordered list of violation messages.
#[derive(Debug, Default)]
pub struct Violations {
    messages: Vec<String>,
}

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `message` unconditionally.
    pub fn push(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    /// Records `message` when `ok` is false.
    pub fn check(&mut self, ok: bool, message: impl Into<String>) {
        if !ok {
            self.push(message);
        }
    }

    /// The value must not be empty or whitespace.
    pub fn required(&mut self, field: &str, value: &str) {
        self.check(!value.trim().is_empty(), format!("{field} is required"));
    }

    /// Inclusive numeric range.
    pub fn range<T: PartialOrd + Display>(&mut self, field: &str, value: T, min: T, max: T) {
        if value < min || value > max {
            self.push(format!("{field} must be between {min} and {max}"));
        }
    }

    /// Inclusive length bound, counted in characters.
    pub fn length(&mut self, field: &str, value: &str, min: usize, max: usize) {
        let len = value.chars().count();
        if len < min || len > max {
            self.push(format!("{field} must be between {min} and {max} characters"));
        }
    }

    /// The value must be one of `allowed`.
    pub fn one_of(&mut self, field: &str, value: &str, allowed: &[&str]) {
        if !allowed.contains(&value) {
            self.push(format!("{field} must be one of: {}", allowed.join(", ")));
        }
    }

    /// An empty value passes; pair with [`required`](Self::required) when the
    /// address is mandatory.
    pub fn email(&mut self, field: &str, value: &str) {
        if !value.is_empty() && !is_valid_email(value) {
            self.push(format!("{field} must be a valid email address"));
        }
    }

    pub fn is_empty(&self) -> bool { self.messages.is_empty() }

    pub fn into_messages(self) -> Vec<String> { self.messages }
}

/// Runs `value`'s rules and tags any failures with `group`.
///
/// Never mutates `value`.
pub fn validate(group: Group, value: &(impl Validate + ?Sized)) -> Result<(), ValidationError> {
    let mut violations = Violations::new();
    value.validate(&mut violations);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(group, violations.into_messages()))
    }
}

/// One `@`, a dot-separated domain, no empty labels.
pub fn is_valid_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || local.starts_with('.') || local.ends_with('.') {
        return false;
    }
    if !local.chars().all(|c| c.is_alphanumeric() || ".!#$%&'*+/=?^_`{|}~-".contains(c)) {
        return false;
    }
    if !domain.contains('.') {
        return false;
    }
    domain.split('.').all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_alphanumeric() || c == '-')
    })
}
