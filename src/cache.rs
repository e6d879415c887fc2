//! # Cache Operations
//!
//! Typed get/set/delete and friends on top of the connection manager.
//!
//! Every operation except [`Cache::increment`] **fails open**: when the store
//! is unreachable, a command fails, or a payload does not decode, the call logs
//! a structured event and returns a neutral result (`None`, `false`, an
//! all-`None` vector). The cache is an optimization layer, so an outage costs
//! latency, never availability. `increment` propagates errors because an
//! approximate counter is a wrong counter.
//!
//! ```rust,ignore
//! let cache = client.cache();
//! cache.set("user:1", &user, Some(Duration::from_secs(60))).await;
//! let user: Option<User> = cache.get("user:1").await;
//! ```

use crate::codec::KeyCodec;
use crate::connection::ConnectionManager;
use crate::constants::SCAN_BATCH_SIZE;
use crate::error::{CacheError, CacheResult};
use crate::store::Command;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Remaining lifetime of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "seconds", rename_all = "snake_case")]
pub enum TtlStatus {
    /// Key expires in this many seconds
    Expires(u64),
    /// Key exists with no expiry
    Persistent,
    /// No such key
    Missing,
    /// Store not connected or the query failed
    Unavailable,
}

impl TtlStatus {
    /// Remaining lifetime, when the key has one
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            Self::Expires(secs) => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }

    /// Integer form using the store's sentinels: `-1` persistent, `-2` missing,
    /// `-3` unavailable
    pub fn as_seconds(&self) -> i64 {
        match self {
            Self::Expires(secs) => *secs as i64,
            Self::Persistent => -1,
            Self::Missing => -2,
            Self::Unavailable => -3,
        }
    }

    fn from_reply(n: i64) -> Self {
        match n {
            -1 => Self::Persistent,
            n if n < 0 => Self::Missing,
            n => Self::Expires(n as u64),
        }
    }
}

/// Fail-open cache operations
#[derive(Debug, Clone)]
pub struct Cache {
    manager: ConnectionManager,
    codec: KeyCodec,
    default_ttl: Duration,
}

impl Cache {
    pub fn new(manager: ConnectionManager, codec: KeyCodec, default_ttl: Duration) -> Self {
        Self {
            manager,
            codec,
            default_ttl,
        }
    }

    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Fetch and decode a value. `None` on miss, outage, store error, or a
    /// payload that does not decode as `T`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.get_raw(key).await {
            Ok(Some((physical, raw))) => {
                debug!(key = %physical, "Cache HIT");
                self.codec.deserialize(&physical, &raw)
            }
            Ok(None) => {
                debug!(key = key, "Cache MISS");
                None
            }
            Err(e) => fail_open("get", key, &e, None),
        }
    }

    async fn get_raw(&self, key: &str) -> CacheResult<Option<(String, String)>> {
        let physical = self.codec.encode(key)?;
        let raw = self
            .manager
            .execute(Command::Get {
                key: physical.clone(),
            })
            .await?
            .into_optional_text()?;
        Ok(raw.map(|raw| (physical, raw)))
    }

    /// Store a value with a TTL (`None` uses the configured default)
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) -> bool {
        let ttl = ttl.unwrap_or(self.default_ttl);
        match self.write(key, value, Some(ttl)).await {
            Ok(()) => {
                debug!(key = key, ttl_seconds = ttl.as_secs(), "Cache SET");
                true
            }
            Err(e) => fail_open("set", key, &e, false),
        }
    }

    /// Store a value that never expires
    pub async fn set_persistent<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        match self.write(key, value, None).await {
            Ok(()) => {
                debug!(key = key, "Cache SET (persistent)");
                true
            }
            Err(e) => fail_open("set_persistent", key, &e, false),
        }
    }

    async fn write<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let physical = self.codec.encode(key)?;
        let payload = self.codec.serialize(value)?;
        self.manager
            .execute(Command::Set {
                key: physical,
                value: payload,
                ttl,
                only_if_absent: false,
            })
            .await?;
        Ok(())
    }

    /// Delete one key. `true` when the command ran, whether or not the key existed.
    pub async fn del(&self, key: &str) -> bool {
        self.del_many(&[key]).await
    }

    /// Delete several keys in one command
    pub async fn del_many(&self, keys: &[&str]) -> bool {
        if keys.is_empty() {
            return true;
        }

        let result: CacheResult<i64> = async {
            let physical = self.codec.encode_many(keys)?;
            self.manager
                .execute(Command::Del { keys: physical })
                .await?
                .into_int()
        }
        .await;

        match result {
            Ok(deleted) => {
                debug!(keys = ?keys, deleted = deleted, "Cache DEL");
                true
            }
            Err(e) => fail_open("del", &keys.join(","), &e, false),
        }
    }

    pub async fn exists(&self, key: &str) -> bool {
        let result: CacheResult<i64> = async {
            let physical = self.codec.encode(key)?;
            self.manager
                .execute(Command::Exists { key: physical })
                .await?
                .into_int()
        }
        .await;

        match result {
            Ok(n) => n > 0,
            Err(e) => fail_open("exists", key, &e, false),
        }
    }

    /// Atomically add `delta` to a numeric key and return the new value.
    ///
    /// Unlike every other operation this one propagates failure: callers use
    /// the exact result for counting.
    pub async fn increment(&self, key: &str, delta: i64) -> CacheResult<i64> {
        let result: CacheResult<i64> = async {
            let physical = self.codec.encode(key)?;
            self.manager
                .execute(Command::IncrBy {
                    key: physical,
                    delta,
                })
                .await?
                .into_int()
        }
        .await;

        if let Err(e) = &result {
            error!(operation = "increment", key = key, error = %e, "Cache counter update failed");
        }
        result
    }

    /// Set or overwrite the TTL on an existing key; `false` when the key is missing
    pub async fn expire(&self, key: &str, ttl: Duration) -> bool {
        let result: CacheResult<i64> = async {
            let physical = self.codec.encode(key)?;
            self.manager
                .execute(Command::Expire { key: physical, ttl })
                .await?
                .into_int()
        }
        .await;

        match result {
            Ok(n) => n == 1,
            Err(e) => fail_open("expire", key, &e, false),
        }
    }

    pub async fn get_ttl(&self, key: &str) -> TtlStatus {
        let result: CacheResult<i64> = async {
            let physical = self.codec.encode(key)?;
            self.manager
                .execute(Command::Ttl { key: physical })
                .await?
                .into_int()
        }
        .await;

        match result {
            Ok(n) => TtlStatus::from_reply(n),
            Err(e) => fail_open("get_ttl", key, &e, TtlStatus::Unavailable),
        }
    }

    /// Delete every key in this namespace matching a glob pattern.
    ///
    /// Keys are enumerated with `SCAN` (never `KEYS`) and deleted page by page.
    /// Keys written concurrently may or may not be caught.
    pub async fn flush_by_pattern(&self, pattern: &str) -> bool {
        match self.delete_matching(pattern).await {
            Ok(deleted) => {
                debug!(pattern = pattern, deleted = deleted, "Cache pattern DEL");
                true
            }
            Err(e) => fail_open("flush_by_pattern", pattern, &e, false),
        }
    }

    async fn delete_matching(&self, pattern: &str) -> CacheResult<u64> {
        let physical_pattern = self.codec.encode_pattern(pattern)?;
        let mut deleted: u64 = 0;
        let mut cursor: u64 = 0;

        loop {
            let (next_cursor, keys) = self
                .manager
                .execute(Command::Scan {
                    cursor,
                    pattern: physical_pattern.clone(),
                    count: SCAN_BATCH_SIZE,
                })
                .await?
                .into_scan_page()?;

            if !keys.is_empty() {
                let count = self
                    .manager
                    .execute(Command::Del { keys })
                    .await?
                    .into_int()?;
                deleted += count.max(0) as u64;
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(deleted)
    }

    /// Return the cached value, or call `fetcher`, cache its result, and return it.
    ///
    /// The cache is advisory here: if reading or writing fails the fetcher's
    /// value is still returned. Only the fetcher's own error propagates. The
    /// fetcher is not called when the key is present.
    pub async fn get_or_populate<T, F, Fut, E>(
        &self,
        key: &str,
        fetcher: F,
        ttl: Option<Duration>,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get::<T>(key).await {
            return Ok(cached);
        }

        let value = fetcher().await?;
        if !self.set(key, &value, ttl).await {
            debug!(key = key, "Populated value was not cached");
        }
        Ok(value)
    }

    /// Fetch several keys in one round trip. The result has one slot per
    /// requested key, in order.
    pub async fn multi_get<T: DeserializeOwned>(&self, keys: &[&str]) -> Vec<Option<T>> {
        if keys.is_empty() {
            return Vec::new();
        }

        // Invalid keys stay `None` without failing the rest of the batch
        let physical: Vec<Option<String>> = keys.iter().map(|k| self.codec.encode(k).ok()).collect();
        let valid: Vec<String> = physical.iter().flatten().cloned().collect();
        if valid.is_empty() {
            return keys.iter().map(|_| None).collect();
        }

        let result: CacheResult<Vec<Option<String>>> = async {
            self.manager
                .execute(Command::MGet { keys: valid })
                .await?
                .into_list()
        }
        .await;

        let mut fetched = match result {
            Ok(values) => values.into_iter(),
            Err(e) => {
                return fail_open(
                    "multi_get",
                    &keys.join(","),
                    &e,
                    keys.iter().map(|_| None).collect(),
                )
            }
        };

        physical
            .iter()
            .map(|slot| {
                let physical_key = slot.as_ref()?;
                let raw = fetched.next().flatten()?;
                self.codec.deserialize(physical_key, &raw)
            })
            .collect()
    }

    /// Write all entries as one pipelined, atomic batch, applied in order.
    /// Returns a single flag for the whole batch.
    pub async fn multi_set<T: Serialize>(&self, entries: &[(&str, T)], ttl: Option<Duration>) -> bool {
        if entries.is_empty() {
            return true;
        }
        let ttl = ttl.unwrap_or(self.default_ttl);

        let result: CacheResult<()> = async {
            let commands = entries
                .iter()
                .map(|(key, value)| -> CacheResult<Command> {
                    Ok(Command::Set {
                        key: self.codec.encode(key)?,
                        value: self.codec.serialize(value)?,
                        ttl: Some(ttl),
                        only_if_absent: false,
                    })
                })
                .collect::<CacheResult<Vec<_>>>()?;
            self.manager.execute_batch(commands).await
        }
        .await;

        match result {
            Ok(()) => {
                debug!(entries = entries.len(), ttl_seconds = ttl.as_secs(), "Cache MSET");
                true
            }
            Err(e) => {
                let keys: Vec<&str> = entries.iter().map(|(k, _)| *k).collect();
                fail_open("multi_set", &keys.join(","), &e, false)
            }
        }
    }
}

/// Log a degraded operation and hand back its neutral result
fn fail_open<T>(operation: &str, key: &str, error: &CacheError, fallback: T) -> T {
    match error {
        CacheError::NotConnected(state) => {
            warn!(
                operation = operation,
                key = key,
                state = %state,
                "Cache unavailable, returning fallback"
            );
        }
        CacheError::InvalidKey(_) | CacheError::Serialization(_) => {
            warn!(operation = operation, key = key, error = %error, "Cache operation rejected");
        }
        _ => {
            error!(
                operation = operation,
                key = key,
                error = %error,
                "Cache operation failed, returning fallback"
            );
        }
    }
    fallback
}
