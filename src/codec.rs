//! Key namespacing and value serialization
//!
//! Every logical key gets the configured namespace prefix so several
//! applications can share one store. Values travel as JSON text; a value that
//! fails to decode is treated as a miss rather than an error.

use crate::error::{CacheError, CacheResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCodec {
    prefix: String,
}

impl KeyCodec {
    pub fn new<S: Into<String>>(prefix: S) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Physical key for a logical key. Empty logical keys are rejected.
    pub fn encode(&self, logical: &str) -> CacheResult<String> {
        if logical.is_empty() {
            return Err(CacheError::InvalidKey("logical key is empty".to_string()));
        }
        Ok(format!("{}{}", self.prefix, logical))
    }

    pub fn encode_many(&self, logical: &[&str]) -> CacheResult<Vec<String>> {
        logical.iter().map(|k| self.encode(k)).collect()
    }

    /// Namespace a glob pattern. The prefix is escaped so glob metacharacters
    /// in it match literally.
    pub fn encode_pattern(&self, pattern: &str) -> CacheResult<String> {
        if pattern.is_empty() {
            return Err(CacheError::InvalidKey("pattern is empty".to_string()));
        }
        Ok(format!("{}{}", escape_glob(&self.prefix), pattern))
    }

    /// Strip the namespace prefix from a physical key
    pub fn decode<'a>(&self, physical: &'a str) -> Option<&'a str> {
        physical.strip_prefix(self.prefix.as_str())
    }

    pub fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> CacheResult<String> {
        Ok(serde_json::to_string(value)?)
    }

    /// Decode a stored payload; `None` when it does not fit `T`
    pub fn deserialize<T: DeserializeOwned>(&self, key: &str, raw: &str) -> Option<T> {
        match serde_json::from_str(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = key, error = %e, "Cache entry failed to deserialize, treating as miss");
                None
            }
        }
    }
}

fn escape_glob(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
