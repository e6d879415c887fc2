//! # Client Constants
//!
//! Default values for connection management, key namespacing, and locking.
//! Every value here can be overridden through [`crate::config::CacheConfig`].

use std::time::Duration;

/// Store URL used when `REDIS_URL` is not set
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Namespace prefix applied to every logical key
pub const DEFAULT_KEY_PREFIX: &str = "app:";

/// TTL applied by `set` when the caller passes `None`
pub const DEFAULT_TTL_SECONDS: u64 = 3600;

/// Upper bound on a single connect attempt
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Reconnect delay grows by this much per attempt
pub const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_millis(100);

/// Reconnect delay never exceeds this
pub const DEFAULT_RECONNECT_MAX_DELAY: Duration = Duration::from_millis(3000);

/// Consecutive failed reconnects before giving up
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Lock lifetime when the caller does not pick one
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(30);

/// Segment inserted between the namespace prefix and a lock name
pub const LOCK_KEY_SEGMENT: &str = "lock:";

/// Segment inserted between the namespace prefix and a rate-limit subject
pub const RATE_LIMIT_KEY_SEGMENT: &str = "rate_limit:";

/// Hint passed to SCAN during pattern flushes
pub const SCAN_BATCH_SIZE: usize = 100;
