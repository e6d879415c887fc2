//! Cache client error types
//!
//! Most cache operations never surface these to callers: they log the error and
//! return a neutral value instead. Only `increment`, configuration loading, and
//! the lower-level store layer return them directly.

use crate::connection::ConnectionState;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while talking to the remote store
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheError {
    /// Handshake, authentication, or network failure while connecting
    #[error("Cache connection error: {0}")]
    Connection(String),

    /// Connect attempt exceeded the configured timeout
    #[error("Cache connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// An established connection dropped mid-operation
    #[error("Cache connection lost: {0}")]
    ConnectionLost(String),

    /// Operation attempted while the connection is not ready
    #[error("Cache not connected (state: {0})")]
    NotConnected(ConnectionState),

    /// Payload could not be encoded or decoded
    #[error("Cache serialization error: {0}")]
    Serialization(String),

    /// The store rejected the command
    #[error("Cache backend error: {0}")]
    Backend(String),

    /// Logical key was empty or otherwise unusable
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    /// Configuration could not be loaded or failed validation
    #[error("Cache configuration error: {0}")]
    Configuration(String),
}

impl CacheError {
    /// Whether this error means the live connection is gone and reconnection is needed
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, Self::ConnectionLost(_))
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for CacheError {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;
