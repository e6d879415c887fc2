//! Shared helpers for integration tests
#![allow(dead_code)]

use parking_lot::Mutex;
use resilient_cache::{CacheClient, CacheConfig, ConnectionState, MemoryStore, StoreBackend};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("resilient_cache=debug")
        .with_test_writer()
        .try_init();
}

/// Client over an in-memory store with millisecond reconnect delays
pub fn memory_client_with_attempts(attempts: u32) -> (MemoryStore, CacheClient) {
    init_tracing();
    let store = MemoryStore::new();
    let config = CacheConfig::default()
        .with_key_prefix("test:")
        .with_reconnect_policy(Duration::from_millis(1), Duration::from_millis(5), attempts);
    let client = CacheClient::with_backend(config, StoreBackend::from(store.clone()))
        .expect("valid test config");
    (store, client)
}

pub fn memory_client() -> (MemoryStore, CacheClient) {
    memory_client_with_attempts(10)
}

/// Memory-backed client that is already `Ready`
pub async fn connected_client() -> (MemoryStore, CacheClient) {
    let (store, client) = memory_client();
    assert_eq!(client.connect().await, ConnectionState::Ready);
    (store, client)
}

pub async fn wait_for_state(client: &CacheClient, target: ConnectionState) {
    let mut rx = client.subscribe();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == target))
        .await
        .unwrap_or_else(|_| panic!("state {target} not reached in time"))
        .expect("state channel closed");
}

/// One recorded event: `level`, `target`, `message`, and every field as text
pub type CapturedEvent = HashMap<String, String>;

/// Layer that records events so tests can assert on structured fields
#[derive(Clone, Default)]
pub struct EventCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl EventCapture {
    /// Capture events on the current thread until the guard drops.
    ///
    /// Use from a current-thread runtime (the `#[tokio::test]` default).
    pub fn install() -> (Self, DefaultGuard) {
        let capture = Self::default();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        (capture, tracing::subscriber::set_default(subscriber))
    }

    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().clone()
    }

    /// Events whose fields include every `(name, value)` pair
    pub fn matching(&self, fields: &[(&str, &str)]) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|event| {
                fields
                    .iter()
                    .all(|(name, value)| event.get(*name).map(String::as_str) == Some(*value))
            })
            .collect()
    }
}

impl<S: tracing::Subscriber> Layer<S> for EventCapture {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = FieldRecorder::default();
        event.record(&mut fields);
        let mut recorded = fields.0;
        recorded.insert("level".to_string(), event.metadata().level().to_string());
        recorded.insert("target".to_string(), event.metadata().target().to_string());
        self.events.lock().push(recorded);
    }
}

#[derive(Default)]
struct FieldRecorder(CapturedEvent);

impl Visit for FieldRecorder {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}
