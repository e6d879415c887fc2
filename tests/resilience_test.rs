//! Outage behavior: fail-open results, reconnects, terminal failure

mod common;

use common::{connected_client, memory_client, memory_client_with_attempts, wait_for_state, EventCapture};
use resilient_cache::{CacheError, ConnectionState, TtlStatus};
use std::time::Duration;

#[tokio::test]
async fn test_operations_fail_open_before_connect() {
    let (store, client) = memory_client();
    let cache = client.cache();

    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(cache.get::<String>("k").await, None);
    assert!(!cache.set("k", &"v", None).await);
    assert!(!cache.del("k").await);
    assert!(!cache.exists("k").await);
    assert!(!cache.expire("k", Duration::from_secs(1)).await);
    assert!(!cache.flush_by_pattern("*").await);
    assert_eq!(cache.get_ttl("k").await, TtlStatus::Unavailable);
    assert_eq!(cache.multi_get::<String>(&["a", "b"]).await, vec![None, None]);
    assert!(!cache.multi_set(&[("a", 1)], None).await);

    // No network activity while disconnected
    assert_eq!(store.connect_attempts(), 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_increment_propagates_not_connected() {
    let (_, client) = memory_client();

    let err = client.cache().increment("counter", 1).await.unwrap_err();
    assert_eq!(err, CacheError::NotConnected(ConnectionState::Disconnected));
}

#[tokio::test]
async fn test_outage_degrades_then_recovers() {
    let (store, client) = memory_client_with_attempts(1000);
    client.connect().await;
    let cache = client.cache();
    assert!(cache.set("k", &"before", None).await);

    store.set_available(false);

    // First operation observes the drop; later ones short-circuit
    assert_eq!(cache.get::<String>("k").await, None);
    assert_eq!(client.state(), ConnectionState::Reconnecting);
    assert!(!cache.set("k", &"during", None).await);
    assert!(cache.increment("n", 1).await.is_err());
    assert!(client.lock().acquire("job", None, None).await.is_none());

    store.set_available(true);
    wait_for_state(&client, ConnectionState::Ready).await;

    assert_eq!(cache.get::<String>("k").await.as_deref(), Some("before"));
    assert!(cache.set("k", &"after", None).await);
    assert_eq!(client.stats().connection_losses, 1);
}

#[tokio::test]
async fn test_get_or_populate_returns_fetched_value_during_outage() {
    let (store, client) = connected_client().await;
    store.set_available(false);

    let value: Result<u32, std::io::Error> = client
        .cache()
        .get_or_populate("expensive", || async { Ok(99) }, None)
        .await;
    assert_eq!(value.unwrap(), 99);

    client.disconnect().await;
}

#[tokio::test]
async fn test_reconnect_exhaustion_is_terminal() {
    let (store, client) = memory_client_with_attempts(3);
    client.connect().await;

    store.set_available(false);
    let _ = client.cache().exists("k").await;
    wait_for_state(&client, ConnectionState::TerminallyFailed).await;

    let attempts = store.connect_attempts();
    store.set_available(true);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(client.state(), ConnectionState::TerminallyFailed);
    assert_eq!(store.connect_attempts(), attempts);
    assert!(!client.cache().set("k", &1, None).await);
    assert!(!client.health().await.connected);

    // Re-initialization is explicit
    assert_eq!(client.connect().await, ConnectionState::Ready);
    assert!(client.cache().set("k", &1, None).await);
}

#[tokio::test]
async fn test_state_subscribers_see_lifecycle() {
    let (store, client) = memory_client_with_attempts(1000);
    let mut rx = client.subscribe();

    client.connect().await;
    assert_eq!(*rx.borrow_and_update(), ConnectionState::Ready);

    store.drop_connections();
    let _ = client.cache().exists("k").await;
    rx.changed().await.unwrap();
    let observed = *rx.borrow_and_update();
    assert!(matches!(
        observed,
        ConnectionState::Reconnecting | ConnectionState::Ready
    ));

    wait_for_state(&client, ConnectionState::Ready).await;
    client.disconnect().await;
    assert_eq!(*rx.borrow_and_update(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_connect_while_store_down_keeps_retrying_in_background() {
    let (store, client) = memory_client_with_attempts(1000);
    store.set_available(false);

    assert_eq!(client.connect().await, ConnectionState::Reconnecting);
    assert_eq!(client.cache().get::<u8>("k").await, None);

    store.set_available(true);
    wait_for_state(&client, ConnectionState::Ready).await;
    assert!(client.cache().set("k", &1u8, None).await);
}

#[tokio::test]
async fn test_degraded_operations_log_operation_and_state() {
    let (capture, _guard) = EventCapture::install();
    let (_, client) = memory_client();

    assert_eq!(client.cache().get::<String>("k").await, None);
    assert!(!client.cache().set("other", &1, None).await);

    let get_events = capture.matching(&[("operation", "get"), ("state", "disconnected")]);
    assert_eq!(get_events.len(), 1);
    assert_eq!(get_events[0]["level"], "WARN");
    assert_eq!(get_events[0]["key"], "k");
    assert_eq!(get_events[0]["target"], "resilient_cache::cache");

    assert_eq!(
        capture
            .matching(&[("operation", "set"), ("state", "disconnected"), ("key", "other")])
            .len(),
        1
    );
}

#[tokio::test]
async fn test_connection_loss_logs_error_then_reconnecting_state() {
    let (store, client) = memory_client_with_attempts(1000);
    client.connect().await;
    let (capture, _guard) = EventCapture::install();

    store.set_available(false);
    assert_eq!(client.cache().get::<String>("k").await, None);
    assert!(!client.cache().exists("k").await);

    // The operation that saw the drop reports the error
    let failed = capture.matching(&[("operation", "get"), ("key", "k")]);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["level"], "ERROR");
    assert!(failed[0].contains_key("error"));

    // Later operations short-circuit on the state
    let degraded = capture.matching(&[("operation", "exists"), ("state", "reconnecting")]);
    assert_eq!(degraded.len(), 1);
    assert_eq!(degraded[0]["level"], "WARN");

    client.disconnect().await;
}
