//! Integration tests for the remote client and the dashboard facade, driven
//! through an in-memory transport.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::{json, Value};
use tokio_test::assert_pending;

use common::{connected_harness, harness, harness_with, settings};
use dashboard_cache::cache::LocalCache;
use dashboard_cache::config::{ClientSettings, TtlClasses};
use dashboard_cache::remote::{ConnectionState, StoreOutcome};
use dashboard_cache::resilience::CircuitState;
use dashboard_cache::{CacheError, DashboardCache};

fn dashboard(client: &std::sync::Arc<dashboard_cache::RemoteCacheClient>) -> DashboardCache {
    DashboardCache::new(client.clone(), TtlClasses::default())
}

// == Validation ==

#[tokio::test]
async fn test_invalid_org_id_never_reaches_store() {
    let h = harness();
    let cache = dashboard(&h.client);

    let too_long = "o".repeat(300);
    let err = cache.cache_kpis(&too_long, &json!({"mrr": 1})).await;
    assert!(matches!(err, Err(CacheError::InvalidKey(_))));

    let err = cache.cache_kpis("org 1\r\nFLUSHALL", &json!({"mrr": 1})).await;
    assert!(matches!(err, Err(CacheError::InvalidKey(_))));

    assert_eq!(h.store.call_count(), 0);
    assert_eq!(h.connector.connects.load(Ordering::SeqCst), 0);
    assert_eq!(h.client.metrics().total_ops, 0);
}

#[tokio::test]
async fn test_oversized_value_rejected_without_network() {
    let h = harness_with(ClientSettings {
        max_value_bytes: 64,
        ..settings(5)
    });
    let cache = dashboard(&h.client);

    let leads: Vec<String> = (0..50).map(|i| format!("lead-{}", i)).collect();
    let err = cache.cache_leads("org1", &leads).await;

    assert!(matches!(err, Err(CacheError::ValueTooLarge { max: 64, .. })));
    assert_eq!(h.store.call_count(), 0);
    assert_eq!(h.connector.connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_null_value_skips_network() {
    let h = harness();
    let cache = dashboard(&h.client);

    let outcome = cache.cache_kpis("org1", &Value::Null).await;
    assert_eq!(outcome, Ok(StoreOutcome::NothingToStore));
    assert_eq!(h.store.call_count(), 0);
}

// == Round trips ==

#[tokio::test]
async fn test_kpis_round_trip_with_lazy_connect() {
    let h = harness();
    let cache = dashboard(&h.client);

    let kpis = json!({"mrr": 12000, "churn": 0.02});
    assert_eq!(cache.cache_kpis("org1", &kpis).await, Ok(StoreOutcome::Stored));
    assert_eq!(h.client.connection_state(), ConnectionState::Connected);

    let read: Option<Value> = cache.get_kpis("org1").await;
    assert_eq!(read, Some(kpis));
    assert!(h.store.raw("kpis:org1").is_some());

    let missing: Option<Value> = cache.get_kpis("org2").await;
    assert_eq!(missing, None);

    let metrics = h.client.metrics();
    assert_eq!(metrics.cache_hits, 1);
    assert_eq!(metrics.cache_misses, 1);
}

#[tokio::test]
async fn test_session_is_stored_without_secrets() {
    let h = connected_harness(settings(5)).await;
    let cache = dashboard(&h.client);

    let session = json!({
        "user_id": "u1",
        "name": "Ana",
        "token": "eyJhbGciOi",
        "auth": {"refresh_token": "r-123", "scopes": ["read"]}
    });
    cache.cache_user_session("u1", &session).await.unwrap();

    let raw = h.store.raw("session:u1").unwrap();
    assert!(!raw.contains("eyJhbGciOi"));
    assert!(!raw.contains("r-123"));

    let stored: Value = cache.get_user_session("u1").await.unwrap();
    assert_eq!(
        stored,
        json!({"user_id": "u1", "name": "Ana", "auth": {"scopes": ["read"]}})
    );
}

#[tokio::test]
async fn test_reads_degrade_to_miss_on_failure() {
    let h = connected_harness(settings(5)).await;
    let cache = dashboard(&h.client);
    cache.cache_leads("org1", &json!(["a", "b"])).await.unwrap();

    h.store.set_failing(true);
    let leads: Option<Value> = cache.get_leads("org1").await;
    assert_eq!(leads, None);
}

#[tokio::test]
async fn test_invalidate_pattern() {
    let h = connected_harness(settings(5)).await;
    let cache = dashboard(&h.client);
    cache.cache_kpis("org1", &json!(1)).await.unwrap();
    cache.cache_kpis("org2", &json!(2)).await.unwrap();
    cache.cache_leads("org1", &json!([])).await.unwrap();

    let removed = cache.invalidate_cache("kpis:*").await.unwrap();

    assert_eq!(removed, 2);
    assert_eq!(h.store.keys(), vec!["leads:org1".to_string()]);
}

// == Local front layer ==

fn layered(
    h: &common::Harness,
    ttl: TtlClasses,
) -> (DashboardCache, dashboard_cache::cache::SharedLocalCache) {
    let local = std::sync::Arc::new(tokio::sync::RwLock::new(LocalCache::with_clock(
        60_000,
        h.clock.clone(),
    )));
    let cache = DashboardCache::new(h.client.clone(), ttl).with_local_layer(local.clone());
    (cache, local)
}

#[tokio::test]
async fn test_read_racing_invalidation_does_not_refill_local() {
    let h = connected_harness(settings(5)).await;
    let (cache, local) = layered(&h, TtlClasses::default());
    h.store.insert_raw("kpis:org1", r#"{"mrr":1}"#);
    h.store.hold_reads();

    let racing = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.get_kpis::<Value>("org1").await })
    };
    while !h.store.calls().contains(&"GET kpis:org1".to_string()) {
        tokio::task::yield_now().await;
    }

    // The read already holds the old value when the invalidation runs
    assert_eq!(cache.invalidate_cache("kpis:*").await, Ok(1));

    h.store.release_reads();
    assert_eq!(racing.await.unwrap(), Some(json!({"mrr": 1})));

    assert!(!local.read().await.contains_key("kpis:org1"));
    let after: Option<Value> = cache.get_kpis("org1").await;
    assert_eq!(after, None);
}

#[tokio::test]
async fn test_local_refill_bounded_by_namespace_ttl() {
    let h = connected_harness(settings(5)).await;
    let ttl = TtlClasses {
        kpis: Duration::from_secs(5),
        ..TtlClasses::default()
    };
    let (cache, local) = layered(&h, ttl);
    h.store.insert_raw("kpis:org1", r#"{"mrr":1}"#);

    let first: Option<Value> = cache.get_kpis("org1").await;
    assert_eq!(first, Some(json!({"mrr": 1})));
    assert!(local.read().await.contains_key("kpis:org1"));

    // Past the namespace TTL the local copy is gone, though the local default is 60s
    h.clock.advance(Duration::from_secs(6));
    assert_eq!(local.write().await.get("kpis:org1"), None);
}

// == Circuit breaker ==

#[tokio::test]
async fn test_breaker_opens_and_rejects_without_transport() {
    let h = connected_harness(settings(5)).await;
    h.store.set_failing(true);

    for _ in 0..5 {
        let result = h.client.get_json::<Value>("kpis:org1").await;
        assert!(matches!(result, Err(CacheError::Remote(_))));
    }
    assert_eq!(h.client.breaker().state(), CircuitState::Open);
    assert_eq!(h.store.call_count(), 5);

    let result = h.client.get_json::<Value>("kpis:org1").await;
    assert_eq!(result, Err(CacheError::BreakerOpen));
    assert_eq!(h.store.call_count(), 5);

    let metrics = h.client.metrics();
    assert_eq!(metrics.failed_ops, 6);
}

#[tokio::test]
async fn test_breaker_recovers_after_cooldown() {
    let h = connected_harness(settings(2)).await;
    h.store.set_failing(true);
    for _ in 0..2 {
        let _ = h.client.get_json::<Value>("kpis:org1").await;
    }
    assert_eq!(h.client.breaker().state(), CircuitState::Open);

    h.store.set_failing(false);
    h.clock.advance(Duration::from_secs(61));
    assert_eq!(h.client.breaker().state(), CircuitState::HalfOpen);

    let result = h.client.get_json::<Value>("kpis:org1").await;
    assert_eq!(result, Ok(None));
    assert_eq!(h.client.breaker().state(), CircuitState::Closed);
}

// == Connection lifecycle ==

#[tokio::test]
async fn test_give_up_then_reconnect_after_cooldown() {
    let h = harness();
    h.connector.refuse.store(true, Ordering::SeqCst);

    let result = h.client.connect().await;
    assert!(matches!(result, Err(CacheError::ConnectionFailed(_))));
    assert_eq!(h.client.connection_state(), ConnectionState::Disconnected);
    let attempts = h.connector.connects.load(Ordering::SeqCst);

    // Within the cooldown, operations fail fast without dialing
    let result = h.client.get_json::<Value>("kpis:org1").await;
    assert_eq!(result, Err(CacheError::NotAvailable));
    assert_eq!(h.connector.connects.load(Ordering::SeqCst), attempts);

    h.connector.refuse.store(false, Ordering::SeqCst);
    h.clock.advance(Duration::from_secs(61));

    let result = h.client.get_json::<Value>("kpis:org1").await;
    assert_eq!(result, Ok(None));
    assert_eq!(h.client.connection_state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_health_check_reports_and_feeds_breaker() {
    let h = connected_harness(settings(2)).await;
    assert!(h.client.perform_health_check().await);

    h.store.set_failing(true);
    assert!(!h.client.perform_health_check().await);
    assert!(!h.client.perform_health_check().await);
    assert_eq!(h.client.breaker().state(), CircuitState::Open);
}

#[tokio::test]
async fn test_stats_report_includes_namespaces() {
    let h = connected_harness(settings(5)).await;
    let cache = dashboard(&h.client);
    cache.cache_kpis("org1", &json!(1)).await.unwrap();
    cache.cache_leads("org1", &json!([])).await.unwrap();
    cache.cache_leads("org2", &json!([])).await.unwrap();

    let report = cache.cache_stats().await;

    assert!(report.connection.configured);
    assert_eq!(report.connection.state, ConnectionState::Connected);
    let store = report.remote_store.expect("store introspection");
    assert_eq!(store.version.as_deref(), Some("7.2.0"));
    assert_eq!(store.namespace_keys.get("kpis"), Some(&1));
    assert_eq!(store.namespace_keys.get("leads"), Some(&2));
    assert_eq!(store.namespace_keys.get("session"), Some(&0));
}

// == Shutdown ==

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_operations() {
    let h = connected_harness(settings(5)).await;
    h.store.hold_reads();

    let mut readers = Vec::new();
    for i in 0..3 {
        let client = h.client.clone();
        readers.push(tokio::spawn(async move {
            client.get_json::<Value>(&format!("kpis:org{}", i)).await
        }));
    }
    while h.client.pending_operations() < 3 {
        tokio::task::yield_now().await;
    }

    let mut shutdown = tokio_test::task::spawn(h.client.shutdown());
    assert_pending!(shutdown.poll());
    assert!(h.client.is_shutting_down());

    let late = h.client.get_json::<Value>("kpis:late").await;
    assert_eq!(late, Err(CacheError::ShuttingDown));

    assert_pending!(shutdown.poll());

    h.store.release_reads();
    for reader in readers {
        assert_eq!(reader.await.unwrap(), Ok(None));
    }

    while shutdown.poll().is_pending() {
        tokio::task::yield_now().await;
    }
    assert_eq!(h.client.pending_operations(), 0);
    assert_eq!(h.client.connection_state(), ConnectionState::Disconnected);

    let after = h.client.get_json::<Value>("kpis:org1").await;
    assert_eq!(after, Err(CacheError::ShuttingDown));
    assert_eq!(h.client.connect().await, Err(CacheError::ShuttingDown));
}

#[tokio::test]
async fn test_disconnect_allows_later_operations() {
    let h = connected_harness(settings(5)).await;

    h.client.disconnect().await.unwrap();
    assert_eq!(h.client.connection_state(), ConnectionState::Disconnected);
    assert!(!h.client.is_shutting_down());

    let result = h.client.get_json::<Value>("kpis:org1").await;
    assert_eq!(result, Ok(None));
    assert_eq!(h.client.connection_state(), ConnectionState::Connected);
}
