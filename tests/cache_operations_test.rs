//! Cache operation behavior against the in-memory backend

mod common;

use common::connected_client;
use resilient_cache::TtlStatus;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Lead {
    id: u64,
    email: String,
    score: f64,
}

fn lead(id: u64) -> Lead {
    Lead {
        id,
        email: format!("lead{id}@example.com"),
        score: 0.5,
    }
}

#[tokio::test]
async fn test_set_then_get_round_trips() {
    let (store, client) = connected_client().await;
    let cache = client.cache();

    assert!(cache.set("lead:1", &lead(1), Some(Duration::from_secs(60))).await);
    assert_eq!(cache.get::<Lead>("lead:1").await, Some(lead(1)));

    // Physical key carries the namespace
    assert!(store.raw_get("test:lead:1").is_some());
    assert!(store.raw_get("lead:1").is_none());
}

#[tokio::test]
async fn test_get_missing_key_is_none() {
    let (_, client) = connected_client().await;
    assert_eq!(client.cache().get::<Lead>("nope").await, None);
}

#[tokio::test]
async fn test_undecodable_value_is_a_miss() {
    let (store, client) = connected_client().await;
    store.raw_set("test:lead:bad", "{not json");

    assert_eq!(client.cache().get::<Lead>("lead:bad").await, None);

    store.raw_set("test:lead:wrong-shape", r#"{"id":"x"}"#);
    assert_eq!(client.cache().get::<Lead>("lead:wrong-shape").await, None);
}

#[tokio::test]
async fn test_entry_expires_after_ttl() {
    let (_, client) = connected_client().await;
    let cache = client.cache();

    assert!(cache.set("short", &"v", Some(Duration::from_millis(50))).await);
    assert!(cache.exists("short").await);

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(cache.get::<String>("short").await, None);
    assert!(!cache.exists("short").await);
}

#[tokio::test]
async fn test_default_and_persistent_ttls() {
    let (_, client) = connected_client().await;
    let cache = client.cache();

    assert!(cache.set("defaulted", &1, None).await);
    match cache.get_ttl("defaulted").await {
        TtlStatus::Expires(secs) => assert!(secs > 3590 && secs <= 3600),
        other => panic!("expected expiry, got {other:?}"),
    }

    assert!(cache.set_persistent("forever", &1).await);
    assert_eq!(cache.get_ttl("forever").await, TtlStatus::Persistent);
    assert_eq!(cache.get_ttl("absent").await, TtlStatus::Missing);
}

#[tokio::test]
async fn test_expire_overwrites_ttl() {
    let (_, client) = connected_client().await;
    let cache = client.cache();

    assert!(cache.set_persistent("k", &"v").await);
    assert!(cache.expire("k", Duration::from_secs(30)).await);
    assert!(matches!(cache.get_ttl("k").await, TtlStatus::Expires(s) if s <= 30));

    assert!(!cache.expire("missing", Duration::from_secs(30)).await);
}

#[tokio::test]
async fn test_delete_single_and_many() {
    let (_, client) = connected_client().await;
    let cache = client.cache();

    for key in ["a", "b", "c"] {
        assert!(cache.set(key, &key, None).await);
    }

    assert!(cache.del("a").await);
    assert!(!cache.exists("a").await);

    assert!(cache.del_many(&["b", "c", "never-existed"]).await);
    assert!(!cache.exists("b").await);
    assert!(!cache.exists("c").await);

    // Deleting an absent key still reports the command ran
    assert!(cache.del("a").await);
    assert!(cache.del_many(&[]).await);
}

#[tokio::test]
async fn test_flush_by_pattern_only_removes_matches() {
    let (store, client) = connected_client().await;
    let cache = client.cache();

    for i in 0..250 {
        assert!(cache.set(&format!("session:{i}"), &i, None).await);
    }
    assert!(cache.set("user:1", &"keep", None).await);
    assert!(cache.set("sessions-index", &"keep", None).await);
    // Same logical key in another namespace must survive
    store.raw_set("other:session:1", "\"keep\"");

    assert!(cache.flush_by_pattern("session:*").await);

    assert!(!cache.exists("session:0").await);
    assert!(!cache.exists("session:249").await);
    assert!(cache.exists("user:1").await);
    assert!(cache.exists("sessions-index").await);
    assert_eq!(store.raw_get("other:session:1").as_deref(), Some("\"keep\""));
}

#[tokio::test]
async fn test_increment_counts_atomically() {
    let (_, client) = connected_client().await;
    let cache = client.cache();

    assert_eq!(cache.increment("hits", 1).await.unwrap(), 1);
    assert_eq!(cache.increment("hits", 5).await.unwrap(), 6);
    assert_eq!(cache.increment("hits", -2).await.unwrap(), 4);

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.increment("parallel", 1).await })
        })
        .collect();
    for handle in futures::future::join_all(handles).await {
        handle.unwrap().unwrap();
    }
    assert_eq!(cache.get::<i64>("parallel").await, Some(20));
}

#[tokio::test]
async fn test_increment_non_numeric_is_an_error() {
    let (_, client) = connected_client().await;
    let cache = client.cache();

    assert!(cache.set("text", &"hello", None).await);
    assert!(cache.increment("text", 1).await.is_err());
}

#[tokio::test]
async fn test_get_or_populate_calls_fetcher_once_on_miss() {
    let (_, client) = connected_client().await;
    let cache = client.cache();
    let calls = AtomicUsize::new(0);
    let counter = &calls;

    let value: Result<Lead, std::io::Error> = cache
        .get_or_populate(
            "lead:7",
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(lead(7))
            },
            None,
        )
        .await;
    assert_eq!(value.unwrap(), lead(7));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Hit: fetcher must not run
    let value: Result<Lead, std::io::Error> = cache
        .get_or_populate(
            "lead:7",
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(lead(999))
            },
            None,
        )
        .await;
    assert_eq!(value.unwrap(), lead(7));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_get_or_populate_propagates_fetcher_error_without_caching() {
    let (_, client) = connected_client().await;
    let cache = client.cache();

    let result: Result<Lead, String> = cache
        .get_or_populate("lead:err", || async { Err("upstream down".to_string()) }, None)
        .await;
    assert_eq!(result.unwrap_err(), "upstream down");
    assert!(!cache.exists("lead:err").await);
}

#[tokio::test]
async fn test_multi_get_preserves_order_and_length() {
    let (store, client) = connected_client().await;
    let cache = client.cache();

    assert!(cache.set("a", &1, None).await);
    assert!(cache.set("c", &3, None).await);
    store.raw_set("test:d", "not-a-number");

    let values: Vec<Option<i32>> = cache.multi_get(&["a", "b", "c", "", "d"]).await;
    assert_eq!(values, vec![Some(1), None, Some(3), None, None]);

    let empty: Vec<Option<i32>> = cache.multi_get(&[]).await;
    assert!(empty.is_empty());
}

#[tokio::test]
async fn test_multi_set_writes_all_entries() {
    let (_, client) = connected_client().await;
    let cache = client.cache();

    let entries = [("x", lead(1)), ("y", lead(2)), ("x", lead(3))];
    assert!(cache.multi_set(&entries, Some(Duration::from_secs(60))).await);

    // Applied in submission order: the later write to "x" wins
    assert_eq!(cache.get::<Lead>("x").await, Some(lead(3)));
    assert_eq!(cache.get::<Lead>("y").await, Some(lead(2)));
    assert!(matches!(cache.get_ttl("y").await, TtlStatus::Expires(s) if s <= 60));
}

#[tokio::test]
async fn test_multi_set_with_invalid_key_writes_nothing() {
    let (_, client) = connected_client().await;
    let cache = client.cache();

    assert!(!cache.multi_set(&[("ok", 1), ("", 2)], None).await);
    assert!(!cache.exists("ok").await);
}

#[tokio::test]
async fn test_empty_key_is_rejected_as_neutral_result() {
    let (_, client) = connected_client().await;
    let cache = client.cache();

    assert!(!cache.set("", &1, None).await);
    assert_eq!(cache.get::<i32>("").await, None);
    assert!(!cache.exists("").await);
    assert!(cache.increment("", 1).await.is_err());
}
