//! Health reporting and rate limiting through the client facade

mod common;

use common::{connected_client, memory_client};
use resilient_cache::ConnectionState;
use std::time::Duration;

#[tokio::test]
async fn test_health_reflects_connection() {
    let (store, client) = memory_client();

    let report = client.health().await;
    assert!(!report.connected);
    assert_eq!(report.state, ConnectionState::Disconnected);
    assert_eq!(store.connect_attempts(), 0);

    client.connect().await;
    let report = client.health().await;
    assert!(report.connected);
    assert!(report.latency_ms.is_some());

    client.disconnect().await;
    assert!(!client.health().await.connected);
}

#[tokio::test]
async fn test_health_report_is_embeddable_json() {
    let (_, client) = connected_client().await;

    let json = serde_json::to_value(client.health().await).unwrap();
    assert_eq!(json["connected"], true);
    assert_eq!(json["state"], "ready");
    assert!(json["latency_ms"].is_number());
}

#[tokio::test]
async fn test_rate_limiter_throttles_per_subject() {
    let (_, client) = connected_client().await;
    let limiter = client.rate_limiter(2, Duration::from_secs(60));

    assert!(limiter.check("alice@example.com").await.allowed);
    assert!(limiter.check("alice@example.com").await.allowed);

    let denied = limiter.check("alice@example.com").await;
    assert!(!denied.allowed);
    assert!(denied.retry_after.is_some_and(|s| s <= 60));

    assert!(limiter.check("bob@example.com").await.allowed);
}

#[tokio::test]
async fn test_rate_limit_window_resets_after_expiry() {
    let (_, client) = connected_client().await;
    // Expiry has one-second resolution
    let limiter = client.rate_limiter(1, Duration::from_secs(1));

    assert!(limiter.check("subject").await.allowed);
    assert!(!limiter.check("subject").await.allowed);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(limiter.check("subject").await.allowed);
}

#[tokio::test]
async fn test_rate_limiter_allows_when_disconnected() {
    let (_, client) = memory_client();
    let limiter = client.rate_limiter(1, Duration::from_secs(60));

    for _ in 0..5 {
        assert!(limiter.check("subject").await.allowed);
    }
}
