//! # Cache Client
//!
//! One object per process that wires configuration, the connection manager,
//! and the feature components together.
//!
//! ```rust,no_run
//! use resilient_cache::{CacheClient, CacheConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> resilient_cache::CacheResult<()> {
//! let client = Arc::new(CacheClient::new(CacheConfig::from_env()?)?);
//! client.connect().await;
//!
//! client.cache().set("greeting", "hello", Some(Duration::from_secs(60))).await;
//! let greeting: Option<String> = client.cache().get("greeting").await;
//!
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```

use crate::cache::Cache;
use crate::codec::KeyCodec;
use crate::config::CacheConfig;
use crate::connection::{ConnectionManager, ConnectionState, ConnectionStats};
use crate::error::CacheResult;
use crate::health::{HealthMonitor, HealthReport};
use crate::lock::DistributedLock;
use crate::rate_limit::RateLimiter;
use crate::store::StoreBackend;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone)]
pub struct CacheClient {
    config: CacheConfig,
    manager: ConnectionManager,
    codec: KeyCodec,
    cache: Cache,
    lock: DistributedLock,
    health: HealthMonitor,
}

impl CacheClient {
    /// Build a client for the backend named in `config`. Does not connect.
    pub fn new(config: CacheConfig) -> CacheResult<Self> {
        config.validate()?;
        let backend = StoreBackend::from_config(&config)?;
        Ok(Self::assemble(config, backend))
    }

    /// Build a client over an already-constructed backend
    pub fn with_backend(config: CacheConfig, backend: StoreBackend) -> CacheResult<Self> {
        config.validate()?;
        Ok(Self::assemble(config, backend))
    }

    fn assemble(config: CacheConfig, backend: StoreBackend) -> Self {
        info!(
            backend = backend.provider_name(),
            target_url = %backend.describe(),
            key_prefix = %config.key_prefix,
            "Cache client created"
        );

        let manager = ConnectionManager::from_config(&config, backend);
        let codec = KeyCodec::new(config.key_prefix.clone());
        let cache = Cache::new(manager.clone(), codec.clone(), config.default_ttl());
        let lock = DistributedLock::new(manager.clone(), codec.clone());
        let health = HealthMonitor::new(manager.clone());

        Self {
            config,
            manager,
            codec,
            cache,
            lock,
            health,
        }
    }

    /// See [`ConnectionManager::connect`]
    pub async fn connect(&self) -> ConnectionState {
        self.manager.connect().await
    }

    /// Graceful shutdown; call once when the process stops
    pub async fn disconnect(&self) {
        self.manager.disconnect().await;
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.manager.subscribe()
    }

    pub fn stats(&self) -> ConnectionStats {
        self.manager.stats()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn lock(&self) -> &DistributedLock {
        &self.lock
    }

    pub async fn health(&self) -> HealthReport {
        self.health.health().await
    }

    pub fn health_monitor(&self) -> &HealthMonitor {
        &self.health
    }

    /// A limiter allowing `limit` requests per subject per `window`
    pub fn rate_limiter(&self, limit: u64, window: Duration) -> RateLimiter {
        RateLimiter::new(self.manager.clone(), self.codec.clone(), limit, window)
    }
}
