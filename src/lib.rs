#![allow(clippy::doc_markdown)] // Allow technical terms like Redis, SCAN in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Resilient Cache
//!
//! Async client for a shared key-value cache (Redis) with a distributed lock,
//! built so that a cache outage degrades performance rather than availability.
//!
//! ## Overview
//!
//! Several application processes share one store for three things: a cache of
//! expensive-to-compute values, cross-process mutual exclusion, and per-subject
//! rate counters. The client keeps one connection, reconnects with bounded
//! linear backoff when it drops, and turns every failure into a neutral result
//! plus a structured log event.
//!
//! ## Key Features
//!
//! - **Fail-open operations**: reads miss and writes report `false` when the
//!   store is down; only [`Cache::increment`] propagates errors
//! - **Observable connection lifecycle**: [`ConnectionState`] over a `watch`
//!   channel, with terminal failure after bounded reconnect attempts
//! - **Owner-checked locks**: `SET NX PX` acquire, compare-and-delete release
//! - **Namespaced keys**: every key carries the configured prefix
//! - **Typed values**: `serde` generics at each call site
//!
//! ## Module Organization
//!
//! - [`client`] - `CacheClient` facade, constructed once and shared by `Arc`
//! - [`connection`] - Connection manager, state machine, reconnect backoff
//! - [`store`] - Command/reply model and the Redis and in-memory backends
//! - [`codec`] - Key namespacing and JSON value encoding
//! - [`cache`] - Fail-open cache operations
//! - [`lock`] - Distributed lock and its server-side script
//! - [`health`] - Connectivity reports
//! - [`rate_limit`] - Per-subject request limiting
//! - [`config`] - Environment-sourced configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Subscriber setup and structured event helpers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resilient_cache::{CacheClient, CacheConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> resilient_cache::CacheResult<()> {
//! resilient_cache::logging::init_structured_logging();
//!
//! let client = CacheClient::new(CacheConfig::from_env()?)?;
//! client.connect().await;
//!
//! if let Some(owner) = client.lock().acquire("nightly-report", None, None).await {
//!     // ... exclusive work ...
//!     client.lock().release("nightly-report", &owner).await;
//! }
//!
//! let total: Result<u64, std::io::Error> = client
//!     .cache()
//!     .get_or_populate("report:total", || async { Ok(42) }, Some(Duration::from_secs(300)))
//!     .await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod constants;
pub mod error;
pub mod health;
pub mod lock;
pub mod logging;
pub mod rate_limit;
pub mod store;

pub use cache::{Cache, TtlStatus};
pub use client::CacheClient;
pub use codec::KeyCodec;
pub use config::{BackendKind, CacheConfig};
pub use connection::{ConnectionManager, ConnectionState, ConnectionStats, ReconnectBackoff};
pub use error::{CacheError, CacheResult};
pub use health::{HealthMonitor, HealthReport};
pub use lock::{DistributedLock, LockToken};
pub use rate_limit::{RateDecision, RateLimiter};
pub use store::{MemoryStore, StoreBackend};
