//! Connection lifecycle owner
//!
//! The manager holds the single live [`StoreConnection`]. Everything else runs
//! commands through [`ConnectionManager::execute`], which leases the current
//! handle, and reports connection loss back here. Only the manager replaces or
//! drops the handle.

use super::backoff::ReconnectBackoff;
use super::state::ConnectionState;
use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::logging::log_state_transition;
use crate::store::{Command, Reply, StoreBackend, StoreConnection};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Counters describing the connection's history
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    pub successful_connects: u64,
    pub connection_losses: u64,
    pub failed_attempts: u64,
    /// Failed reconnect attempts since the last successful connect
    pub consecutive_failures: u32,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Slot {
    connection: Option<StoreConnection>,
    /// Bumped whenever the connection is installed or dropped, so a failure
    /// reported against an older connection cannot tear down a newer one
    epoch: u64,
}

struct ManagerInner {
    backend: StoreBackend,
    backoff: ReconnectBackoff,
    connect_timeout: Duration,
    slot: RwLock<Slot>,
    state_tx: watch::Sender<ConnectionState>,
    stats: RwLock<ConnectionStats>,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
    /// Serializes explicit connect/disconnect calls
    lifecycle: tokio::sync::Mutex<()>,
}

/// Owns the store connection, its state machine, and reconnect backoff
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("backend", &self.inner.backend.describe())
            .field("state", &self.state())
            .field("backoff", &self.inner.backoff)
            .finish()
    }
}

impl ConnectionManager {
    pub fn new(backend: StoreBackend, backoff: ReconnectBackoff, connect_timeout: Duration) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            inner: Arc::new(ManagerInner {
                backend,
                backoff,
                connect_timeout,
                slot: RwLock::new(Slot::default()),
                state_tx,
                stats: RwLock::new(ConnectionStats::default()),
                reconnect_task: Mutex::new(None),
                lifecycle: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn from_config(config: &CacheConfig, backend: StoreBackend) -> Self {
        Self::new(
            backend,
            ReconnectBackoff::new(
                config.reconnect_base_delay(),
                config.reconnect_max_delay(),
                config.max_reconnect_attempts,
            ),
            config.connect_timeout(),
        )
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Receive every state transition
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn stats(&self) -> ConnectionStats {
        self.inner.stats.read().clone()
    }

    pub fn backend(&self) -> &StoreBackend {
        &self.inner.backend
    }

    /// Open the connection if it is not already open.
    ///
    /// Idempotent: returns immediately while `Ready`, and leaves an in-flight
    /// reconnect alone. From `Disconnected` or `TerminallyFailed` it makes one
    /// attempt bounded by the connect timeout; on failure the background
    /// reconnect loop takes over. Never fails; the outcome is the returned state.
    #[instrument(skip(self), fields(backend = self.inner.backend.provider_name()))]
    pub async fn connect(&self) -> ConnectionState {
        let _guard = self.inner.lifecycle.lock().await;

        match self.state() {
            ConnectionState::Ready => {
                debug!("Already connected to cache store");
                return ConnectionState::Ready;
            }
            ConnectionState::Reconnecting => {
                debug!("Reconnect already in progress");
                return ConnectionState::Reconnecting;
            }
            _ => {}
        }

        self.abort_reconnect();
        self.inner.stats.write().consecutive_failures = 0;
        self.transition(ConnectionState::Connecting);

        info!(target_url = %self.inner.backend.describe(), "Connecting to cache store");

        match self.open_with_timeout().await {
            Ok(connection) => {
                self.install(connection);
                self.state()
            }
            Err(e) => {
                self.record_failure(&e);
                error!(error = %e, "Initial cache connection failed, scheduling reconnect");
                if self.try_transition(&[ConnectionState::Connecting], ConnectionState::Reconnecting) {
                    // The failed initial attempt counts against the reconnect budget
                    self.spawn_reconnect(1);
                }
                self.state()
            }
        }
    }

    /// Close the connection and stop any reconnect loop
    #[instrument(skip(self), fields(backend = self.inner.backend.provider_name()))]
    pub async fn disconnect(&self) {
        let _guard = self.inner.lifecycle.lock().await;

        self.abort_reconnect();

        let connection = {
            let mut slot = self.inner.slot.write();
            slot.epoch += 1;
            slot.connection.take()
        };

        if let Some(mut connection) = connection {
            connection.quit().await;
        }

        self.transition(ConnectionState::Disconnected);
        info!("Disconnected from cache store");
    }

    /// Run one command on the current connection
    pub async fn execute(&self, command: Command) -> CacheResult<Reply> {
        let (epoch, mut connection) = self.lease()?;
        let result = connection.execute(command).await;
        if let Err(e) = &result {
            if e.is_connection_loss() {
                self.connection_lost(epoch, e);
            }
        }
        result
    }

    /// Run commands as one atomic pipelined batch
    pub async fn execute_batch(&self, commands: Vec<Command>) -> CacheResult<()> {
        let (epoch, mut connection) = self.lease()?;
        let result = connection.execute_batch(commands).await;
        if let Err(e) = &result {
            if e.is_connection_loss() {
                self.connection_lost(epoch, e);
            }
        }
        result
    }

    /// A clone of the live connection, only while `Ready`.
    ///
    /// Failures seen on this handle are not reported back; prefer
    /// [`Self::execute`].
    pub fn handle(&self) -> Option<StoreConnection> {
        self.lease().ok().map(|(_, connection)| connection)
    }

    fn lease(&self) -> CacheResult<(u64, StoreConnection)> {
        let slot = self.inner.slot.read();
        let state = self.state();
        match (&slot.connection, state) {
            (Some(connection), ConnectionState::Ready) => Ok((slot.epoch, connection.clone())),
            _ => Err(CacheError::NotConnected(state)),
        }
    }

    async fn open_with_timeout(&self) -> CacheResult<StoreConnection> {
        let timeout = self.inner.connect_timeout;
        match tokio::time::timeout(timeout, self.inner.backend.open()).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::ConnectTimeout(timeout)),
        }
    }

    /// Install a fresh connection if we are still trying to connect
    fn install(&self, connection: StoreConnection) -> bool {
        let installed = {
            let mut slot = self.inner.slot.write();
            let installed = self.try_transition(
                &[ConnectionState::Connecting, ConnectionState::Reconnecting],
                ConnectionState::Ready,
            );
            if installed {
                slot.connection = Some(connection);
                slot.epoch += 1;
            }
            installed
        };

        if installed {
            let mut stats = self.inner.stats.write();
            stats.successful_connects += 1;
            stats.consecutive_failures = 0;
            stats.last_connected_at = Some(Utc::now());
        } else {
            debug!("Discarding connection opened after lifecycle changed");
        }
        installed
    }

    /// Called when an operation observed the connection drop
    fn connection_lost(&self, epoch: u64, error: &CacheError) {
        {
            let mut slot = self.inner.slot.write();
            if slot.epoch != epoch || slot.connection.is_none() {
                // Someone already handled this connection
                return;
            }
            if !self.try_transition(&[ConnectionState::Ready], ConnectionState::Reconnecting) {
                return;
            }
            slot.connection = None;
            slot.epoch += 1;
        }

        {
            let mut stats = self.inner.stats.write();
            stats.connection_losses += 1;
            stats.last_error = Some(error.to_string());
            stats.last_error_at = Some(Utc::now());
        }

        warn!(error = %error, "Cache connection lost, reconnecting");
        self.spawn_reconnect(0);
    }

    /// Start the reconnect loop unless one is already registered.
    ///
    /// A registered handle means a loop that has not yet installed a
    /// connection; the loop deregisters itself in the same critical section
    /// that installs, so a loss observed afterwards always spawns a new loop.
    fn spawn_reconnect(&self, failed_attempts: u32) {
        let mut task = self.inner.reconnect_task.lock();
        if task.is_some() {
            return;
        }
        let manager = self.clone();
        *task = Some(tokio::spawn(async move {
            manager.reconnect_loop(failed_attempts).await;
        }));
    }

    /// Install a connection opened by the reconnect loop and deregister the loop
    fn finish_reconnect(&self, connection: StoreConnection) -> bool {
        let mut task = self.inner.reconnect_task.lock();
        let installed = self.install(connection);
        // Dropping our own handle detaches the task; it only logs and returns now
        *task = None;
        installed
    }

    fn abort_reconnect(&self) {
        if let Some(handle) = self.inner.reconnect_task.lock().take() {
            handle.abort();
        }
    }

    async fn reconnect_loop(&self, failed_attempts: u32) {
        let backoff = self.inner.backoff;

        for attempt in (failed_attempts + 1)..=backoff.max_attempts {
            let delay = backoff.delay_for(attempt).unwrap_or(backoff.max);
            debug!(
                attempt = attempt,
                max_attempts = backoff.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Waiting before cache reconnect attempt"
            );
            tokio::time::sleep(delay).await;

            if self.state() != ConnectionState::Reconnecting {
                debug!(state = %self.state(), "Reconnect loop superseded");
                return;
            }

            match self.open_with_timeout().await {
                Ok(connection) => {
                    if self.finish_reconnect(connection) {
                        info!(attempt = attempt, "Reconnected to cache store");
                    }
                    return;
                }
                Err(e) => {
                    self.record_failure(&e);
                    warn!(
                        attempt = attempt,
                        max_attempts = backoff.max_attempts,
                        error = %e,
                        "Cache reconnect attempt failed"
                    );
                }
            }
        }

        let terminal = {
            let mut task = self.inner.reconnect_task.lock();
            *task = None;
            self.try_transition(&[ConnectionState::Reconnecting], ConnectionState::TerminallyFailed)
        };
        if terminal {
            error!(
                attempts = backoff.max_attempts,
                "Cache reconnect attempts exhausted; client must be re-initialized"
            );
        }
    }

    fn record_failure(&self, error: &CacheError) {
        let mut stats = self.inner.stats.write();
        stats.failed_attempts += 1;
        stats.consecutive_failures += 1;
        stats.last_error = Some(error.to_string());
        stats.last_error_at = Some(Utc::now());
    }

    fn transition(&self, to: ConnectionState) {
        let from = self.inner.state_tx.send_replace(to);
        if from != to {
            log_state_transition(from, to);
        }
    }

    /// Move to `to` only from one of `from`; returns whether it moved
    fn try_transition(&self, from: &[ConnectionState], to: ConnectionState) -> bool {
        let mut previous = None;
        let moved = self.inner.state_tx.send_if_modified(|state| {
            if from.contains(state) {
                previous = Some(*state);
                *state = to;
                true
            } else {
                false
            }
        });
        if let Some(previous) = previous {
            log_state_transition(previous, to);
        }
        moved
    }
}
