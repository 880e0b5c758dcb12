//! Binder and server limits.
//!
//! A [`Config`] is built once, handed to [`Router::config`](crate::Router::config)
//! and read-only from then on. There is no process-wide default to mutate.

use std::env;

use tracing::warn;

/// Default in-memory ceiling for decoded `multipart/form-data` fields (1 MiB).
pub const DEFAULT_MULTIPART_MAX_MEMORY: usize = 1 << 20;

/// Default ceiling for a buffered request body (2 MiB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 2 << 20;

/// Request-handling limits.
///
/// ```rust
/// use tusk::Config;
///
/// let config = Config::default()
///     .with_multipart_max_memory(512 * 1024)
///     .with_max_body_size(8 << 20);
/// assert_eq!(config.multipart_max_memory(), 512 * 1024);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    multipart_max_memory: usize,
    max_body_size: usize,
}

impl Config {
    /// Reads `TUSK_MULTIPART_MAX_MEMORY` and `TUSK_MAX_BODY_SIZE` (bytes),
    /// falling back to the defaults for unset or unparsable values.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            multipart_max_memory: env_bytes("TUSK_MULTIPART_MAX_MEMORY")
                .unwrap_or(defaults.multipart_max_memory),
            max_body_size: env_bytes("TUSK_MAX_BODY_SIZE").unwrap_or(defaults.max_body_size),
        }
    }

    /// Upper bound on the bytes a multipart body may decode into.
    /// Bodies beyond it are rejected, never spilled to disk.
    pub fn with_multipart_max_memory(mut self, bytes: usize) -> Self {
        self.multipart_max_memory = bytes;
        self
    }

    /// Upper bound on a request body the server will buffer.
    pub fn with_max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }

    pub fn multipart_max_memory(&self) -> usize { self.multipart_max_memory }
    pub fn max_body_size(&self) -> usize { self.max_body_size }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            multipart_max_memory: DEFAULT_MULTIPART_MAX_MEMORY,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

fn env_bytes(key: &str) -> Option<usize> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse::<usize>() {
        Ok(n) => Some(n),
        Err(e) => {
            warn!(key, value = %raw, "ignoring invalid byte count: {e}");
            None
        }
    }
}
