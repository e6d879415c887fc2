//! # Store Backends
//!
//! Wire-level contract between the client and the remote store.
//!
//! ```text
//! StoreBackend (enum)               <- Zero-cost dispatch, no vtable
//!   ├── Redis(RedisStore)           <- Multiplexed async Redis connection
//!   └── Memory(MemoryStore)         <- In-process stand-in, fault injectable
//! ```
//!
//! Callers above this layer speak [`Command`] and receive [`Reply`]; they never
//! see backend-specific types. The connection manager opens a
//! [`StoreConnection`] through [`StoreBackend::open`] and hands out clones of
//! it per operation.

pub mod memory;
pub mod redis;

pub use self::memory::{MemoryConnection, MemoryStore};
pub use self::redis::{RedisConnection, RedisStore};

use crate::config::{BackendKind, CacheConfig};
use crate::error::{CacheError, CacheResult};
use std::time::Duration;

/// A single store command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get {
        key: String,
    },
    MGet {
        keys: Vec<String>,
    },
    /// `SET key value [PX ttl] [NX]`
    Set {
        key: String,
        value: String,
        ttl: Option<Duration>,
        only_if_absent: bool,
    },
    Del {
        keys: Vec<String>,
    },
    Exists {
        key: String,
    },
    IncrBy {
        key: String,
        delta: i64,
    },
    Expire {
        key: String,
        ttl: Duration,
    },
    Ttl {
        key: String,
    },
    Scan {
        cursor: u64,
        pattern: String,
        count: usize,
    },
    /// Delete `key` only if it currently holds `expected` (server-side script)
    CompareAndDelete {
        key: String,
        expected: String,
    },
    Ping,
}

impl Command {
    /// Command name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::Get { .. } => "GET",
            Self::MGet { .. } => "MGET",
            Self::Set { .. } => "SET",
            Self::Del { .. } => "DEL",
            Self::Exists { .. } => "EXISTS",
            Self::IncrBy { .. } => "INCRBY",
            Self::Expire { .. } => "EXPIRE",
            Self::Ttl { .. } => "TTL",
            Self::Scan { .. } => "SCAN",
            Self::CompareAndDelete { .. } => "EVALSHA",
            Self::Ping => "PING",
        }
    }

    /// Whether the command creates or rewrites an entry
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Set { .. } | Self::IncrBy { .. })
    }
}

/// Decoded store reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Nil,
    Ok,
    Int(i64),
    Text(String),
    List(Vec<Option<String>>),
    ScanPage { cursor: u64, keys: Vec<String> },
}

impl Reply {
    pub fn into_int(self) -> CacheResult<i64> {
        match self {
            Self::Int(n) => Ok(n),
            other => Err(unexpected("integer", &other)),
        }
    }

    pub fn into_optional_text(self) -> CacheResult<Option<String>> {
        match self {
            Self::Nil => Ok(None),
            Self::Text(s) => Ok(Some(s)),
            other => Err(unexpected("bulk string", &other)),
        }
    }

    pub fn into_list(self) -> CacheResult<Vec<Option<String>>> {
        match self {
            Self::List(items) => Ok(items),
            other => Err(unexpected("array", &other)),
        }
    }

    pub fn into_scan_page(self) -> CacheResult<(u64, Vec<String>)> {
        match self {
            Self::ScanPage { cursor, keys } => Ok((cursor, keys)),
            other => Err(unexpected("scan page", &other)),
        }
    }

    /// `SET` answers `OK` on write and nil when `NX` blocked it
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

fn unexpected(expected: &str, got: &Reply) -> CacheError {
    CacheError::Backend(format!("expected {expected} reply, got {got:?}"))
}

/// Backend factory; opens connections on behalf of the connection manager
#[derive(Debug, Clone)]
pub enum StoreBackend {
    Redis(Box<RedisStore>),
    Memory(MemoryStore),
}

impl StoreBackend {
    /// Build the backend selected by configuration
    pub fn from_config(config: &CacheConfig) -> CacheResult<Self> {
        match config.backend {
            BackendKind::Redis => Ok(Self::Redis(Box::new(RedisStore::from_config(config)?))),
            BackendKind::Memory => Ok(Self::Memory(MemoryStore::new())),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::Redis(_) => "redis",
            Self::Memory(_) => "memory",
        }
    }

    /// Human-readable target with credentials removed
    pub fn describe(&self) -> String {
        match self {
            Self::Redis(s) => s.redacted_url(),
            Self::Memory(_) => "memory://local".to_string(),
        }
    }

    /// Open one connection (handshake included). Timeouts are applied by the caller.
    pub async fn open(&self) -> CacheResult<StoreConnection> {
        match self {
            Self::Redis(s) => s.open().await.map(StoreConnection::Redis),
            Self::Memory(s) => {
                let delay = s.open_delay();
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                s.open().map(StoreConnection::Memory)
            }
        }
    }
}

impl From<MemoryStore> for StoreBackend {
    fn from(store: MemoryStore) -> Self {
        Self::Memory(store)
    }
}

/// A live connection. Cloning is cheap and shares the underlying transport.
#[derive(Clone)]
pub enum StoreConnection {
    Redis(RedisConnection),
    Memory(MemoryConnection),
}

impl std::fmt::Debug for StoreConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Redis(_) => f.write_str("StoreConnection::Redis"),
            Self::Memory(_) => f.write_str("StoreConnection::Memory"),
        }
    }
}

impl StoreConnection {
    pub async fn execute(&mut self, command: Command) -> CacheResult<Reply> {
        match self {
            Self::Redis(c) => c.execute(command).await,
            Self::Memory(c) => c.execute(command),
        }
    }

    /// Submit commands as one atomic, pipelined batch applied in order
    pub async fn execute_batch(&mut self, commands: Vec<Command>) -> CacheResult<()> {
        match self {
            Self::Redis(c) => c.execute_batch(commands).await,
            Self::Memory(c) => c.execute_batch(commands),
        }
    }

    /// Best-effort graceful goodbye
    pub async fn quit(&mut self) {
        match self {
            Self::Redis(c) => c.quit().await,
            Self::Memory(_) => {}
        }
    }
}
