//! Connection health reporting

use crate::connection::{ConnectionManager, ConnectionState};
use crate::store::Command;
use serde::Serialize;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Point-in-time view of cache connectivity, suitable for health endpoints
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub connected: bool,
    pub state: ConnectionState,
    /// PING round trip; `None` when no check was made or it failed
    pub latency_ms: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct HealthMonitor {
    manager: ConnectionManager,
}

impl HealthMonitor {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    /// Check the store.
    ///
    /// Only issues a `PING` while `Ready`; any other state is reported without
    /// touching the network. A failed check reports `connected: false`, and a
    /// dropped connection is handed to the manager's reconnect loop.
    pub async fn health(&self) -> HealthReport {
        let state = self.manager.state();
        if !state.is_ready() {
            debug!(state = %state, "Health check skipped, cache not ready");
            return HealthReport {
                connected: false,
                state,
                latency_ms: None,
            };
        }

        let started = Instant::now();
        match self.manager.execute(Command::Ping).await {
            Ok(_) => {
                let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                debug!(latency_ms = latency_ms, "Cache health check succeeded");
                HealthReport {
                    connected: true,
                    state: self.manager.state(),
                    latency_ms: Some(latency_ms),
                }
            }
            Err(e) => {
                warn!(error = %e, "Cache health check failed");
                HealthReport {
                    connected: false,
                    state: self.manager.state(),
                    latency_ms: None,
                }
            }
        }
    }

    /// Current state without probing
    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Stream of connection state changes
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.manager.subscribe()
    }
}
