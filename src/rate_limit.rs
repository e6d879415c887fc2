//! # Rate Limiting
//!
//! Per-subject request counters on top of the cache store, used to throttle
//! things like outbound notifications per recipient.
//!
//! A subject's counter lives at `<prefix>rate_limit:<subject>`. Each allowed
//! request increments it and re-arms its expiry in one atomic batch, so the
//! window restarts from the last allowed request. Once the counter reaches the
//! limit, requests are denied until the key expires.
//!
//! The limiter fails open: if the store cannot be reached, requests are
//! allowed.

use crate::codec::KeyCodec;
use crate::connection::ConnectionManager;
use crate::constants::RATE_LIMIT_KEY_SEGMENT;
use crate::error::{CacheError, CacheResult};
use crate::store::Command;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error};

/// Outcome of a rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateDecision {
    pub allowed: bool,
    /// Requests left in the current window after this one
    pub remaining: u64,
    /// Seconds until the window resets; set only when denied
    pub retry_after: Option<u64>,
}

impl RateDecision {
    fn allow(remaining: u64) -> Self {
        Self {
            allowed: true,
            remaining,
            retry_after: None,
        }
    }

    fn deny(retry_after: u64) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            retry_after: Some(retry_after),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    manager: ConnectionManager,
    codec: KeyCodec,
    limit: u64,
    window: Duration,
}

impl RateLimiter {
    pub fn new(manager: ConnectionManager, codec: KeyCodec, limit: u64, window: Duration) -> Self {
        Self {
            manager,
            codec,
            limit,
            window,
        }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count one request for `subject` and decide whether it may proceed
    pub async fn check(&self, subject: &str) -> RateDecision {
        match self.try_check(subject).await {
            Ok(decision) => {
                debug!(
                    subject = subject,
                    allowed = decision.allowed,
                    remaining = decision.remaining,
                    "Rate limit checked"
                );
                decision
            }
            Err(e) => {
                error!(
                    operation = "rate_limit",
                    subject = subject,
                    error = %e,
                    "Rate limit check failed, allowing request"
                );
                RateDecision::allow(self.limit.saturating_sub(1))
            }
        }
    }

    async fn try_check(&self, subject: &str) -> CacheResult<RateDecision> {
        if subject.is_empty() {
            return Err(CacheError::InvalidKey("rate limit subject is empty".to_string()));
        }
        let key = self.codec.encode(&format!("{RATE_LIMIT_KEY_SEGMENT}{subject}"))?;

        let current = self
            .manager
            .execute(Command::Get { key: key.clone() })
            .await?
            .into_optional_text()?
            .map(|raw| {
                raw.parse::<u64>()
                    .map_err(|e| CacheError::Backend(format!("rate limit counter {key} is not numeric: {e}")))
            })
            .transpose()?
            .unwrap_or(0);

        if current >= self.limit {
            let ttl = self
                .manager
                .execute(Command::Ttl { key })
                .await?
                .into_int()?;
            // A counter with no expiry would block forever; report a full window
            let retry_after = if ttl > 0 { ttl as u64 } else { self.window_secs() };
            return Ok(RateDecision::deny(retry_after));
        }

        self.manager
            .execute_batch(vec![
                Command::IncrBy {
                    key: key.clone(),
                    delta: 1,
                },
                Command::Expire {
                    key,
                    ttl: self.window,
                },
            ])
            .await?;

        Ok(RateDecision::allow(self.limit - current - 1))
    }

    fn window_secs(&self) -> u64 {
        self.window.as_secs().max(1)
    }
}
