//! # Distributed Lock
//!
//! Cross-process mutual exclusion keyed by name.
//!
//! ## How It Works
//!
//! 1. **Acquire**: `SET <prefix>lock:<name> <owner> NX PX <ttl>`; the store
//!    creates the record only if absent, atomically
//! 2. **Release**: the [`script::COMPARE_AND_DELETE`] script deletes the
//!    record only if it still holds the caller's owner id
//!
//! Exclusion rests entirely on the store's atomicity. No in-process mutex is
//! involved, so two tasks in the same process contend exactly like two
//! processes do.
//!
//! The TTL is the only protection against a crashed holder. There is no lease
//! renewal: a holder that runs past its TTL loses the lock without being told.
//! Pick a TTL comfortably longer than the critical section.

pub mod script;

use crate::codec::KeyCodec;
use crate::connection::ConnectionManager;
use crate::constants::{DEFAULT_LOCK_TTL, LOCK_KEY_SEGMENT};
use crate::error::{CacheError, CacheResult};
use crate::store::Command;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A held lock: `(lock name, owner id, ttl)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    pub name: String,
    pub owner: String,
    pub ttl: Duration,
}

/// Acquire/release of named cross-process locks
#[derive(Debug, Clone)]
pub struct DistributedLock {
    manager: ConnectionManager,
    codec: KeyCodec,
}

impl DistributedLock {
    pub fn new(manager: ConnectionManager, codec: KeyCodec) -> Self {
        Self { manager, codec }
    }

    fn lock_key(&self, name: &str) -> CacheResult<String> {
        if name.is_empty() {
            return Err(CacheError::InvalidKey("lock name is empty".to_string()));
        }
        self.codec.encode(&format!("{LOCK_KEY_SEGMENT}{name}"))
    }

    /// Try once to take the lock.
    ///
    /// Returns the owner id on success (the supplied one, or a fresh UUID).
    /// Returns `None` when another owner holds it, the store is unreachable, or
    /// the command fails. Does not wait or retry.
    pub async fn acquire(&self, name: &str, ttl: Option<Duration>, owner: Option<&str>) -> Option<String> {
        self.acquire_token(name, ttl, owner).await.map(|token| token.owner)
    }

    /// [`Self::acquire`], returning the full token
    pub async fn acquire_token(
        &self,
        name: &str,
        ttl: Option<Duration>,
        owner: Option<&str>,
    ) -> Option<LockToken> {
        let ttl = ttl.unwrap_or(DEFAULT_LOCK_TTL);
        let owner = owner
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let result: CacheResult<bool> = async {
            let key = self.lock_key(name)?;
            let reply = self
                .manager
                .execute(Command::Set {
                    key,
                    value: owner.clone(),
                    ttl: Some(ttl),
                    only_if_absent: true,
                })
                .await?;
            Ok(reply.is_ok())
        }
        .await;

        match result {
            Ok(true) => {
                info!(lock = name, owner = %owner, ttl_ms = ttl.as_millis() as u64, "Lock acquired");
                Some(LockToken {
                    name: name.to_string(),
                    owner,
                    ttl,
                })
            }
            Ok(false) => {
                debug!(lock = name, "Lock held by another owner");
                None
            }
            Err(e) => {
                warn!(lock = name, error = %e, "Lock acquire failed");
                None
            }
        }
    }

    /// Release the lock if `owner` still holds it.
    ///
    /// `true` only when this call deleted the record. A mismatched owner, an
    /// already-expired lock, or an unreachable store all return `false`.
    pub async fn release(&self, name: &str, owner: &str) -> bool {
        let result: CacheResult<i64> = async {
            let key = self.lock_key(name)?;
            self.manager
                .execute(Command::CompareAndDelete {
                    key,
                    expected: owner.to_string(),
                })
                .await?
                .into_int()
        }
        .await;

        match result {
            Ok(1) => {
                info!(
                    lock = name,
                    owner = owner,
                    script = %script::COMPARE_AND_DELETE.qualified_name(),
                    "Lock released"
                );
                true
            }
            Ok(_) => {
                debug!(lock = name, owner = owner, "Release skipped, lock not held by owner");
                false
            }
            Err(e) => {
                warn!(lock = name, owner = owner, error = %e, "Lock release failed");
                false
            }
        }
    }

    pub async fn release_token(&self, token: &LockToken) -> bool {
        self.release(&token.name, &token.owner).await
    }

    /// Run `task` while holding the lock.
    ///
    /// Returns `None` without running `task` when the lock is unavailable.
    /// Release is attempted whether or not `task` succeeded. The TTL is not
    /// extended, so `task` must finish well within it.
    pub async fn with_lock<T, F, Fut>(&self, name: &str, ttl: Option<Duration>, task: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let token = self.acquire_token(name, ttl, None).await?;
        let output = task().await;
        if !self.release_token(&token).await {
            warn!(
                lock = name,
                owner = %token.owner,
                "Lock was no longer held at release; critical section may have outlived its TTL"
            );
        }
        Some(output)
    }
}
