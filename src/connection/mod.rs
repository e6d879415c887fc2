//! # Connection Management
//!
//! A single store connection with an explicit, observable lifecycle.
//!
//! ## Design Decisions
//!
//! - **Explicit state**: [`ConnectionState`] is published on a `watch` channel
//!   rather than through event-listener callbacks
//! - **Manager-owned reconnects**: linear backoff `min(n × 100ms, 3s)`, ten
//!   attempts, then `TerminallyFailed`
//! - **Never throws to cache callers**: connection failures surface as state
//!   and structured log events only

pub mod backoff;
pub mod manager;
pub mod state;

pub use backoff::ReconnectBackoff;
pub use manager::{ConnectionManager, ConnectionStats};
pub use state::ConnectionState;
