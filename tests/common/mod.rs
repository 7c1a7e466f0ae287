//! Shared test doubles: an in-memory store behind the public transport traits.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use dashboard_cache::clock::{ManualClock, SharedClock};
use dashboard_cache::config::{ClientSettings, ConnectionConfig};
use dashboard_cache::remote::{Connector, RemoteCacheClient, Transport};
use dashboard_cache::resilience::{CircuitBreakerConfig, RetryPolicy};
use dashboard_cache::{CacheError, Result};

/// In-memory store that records every command it receives.
pub struct MockStore {
    data: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<String>>,
    failing: AtomicBool,
    gated: AtomicBool,
    gate: Semaphore,
}

impl MockStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            data: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            gated: AtomicBool::new(false),
            gate: Semaphore::new(0),
        })
    }

    /// Commands received so far, e.g. `["SET kpis:org1", "GET kpis:org1"]`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.data.lock().unwrap().get(key).cloned()
    }

    pub fn insert_raw(&self, key: &str, value: &str) {
        self.data
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.data.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Makes reads block until [`MockStore::release_reads`].
    pub fn hold_reads(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    pub fn release_reads(&self) {
        self.gated.store(false, Ordering::SeqCst);
        self.gate.add_permits(1024);
    }

    fn record(&self, command: &str, arg: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {}", command, arg));
        if self.failing.load(Ordering::SeqCst) {
            Err(CacheError::Remote("injected failure".into()))
        } else {
            Ok(())
        }
    }
}

pub struct MockTransport(Arc<MockStore>);

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.0.record("GET", key)?;
        // The reply is fixed when the command arrives, like a real server
        let value = self.0.raw(key);
        if self.0.gated.load(Ordering::SeqCst) {
            let _ = self.0.gate.acquire().await;
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, _ttl: Duration) -> Result<()> {
        self.0.record("SET", key)?;
        self.0.insert_raw(key, value);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        self.0.record("DEL", &keys.join(" "))?;
        let mut data = self.0.data.lock().unwrap();
        Ok(keys.iter().filter(|k| data.remove(*k).is_some()).count() as u64)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        self.0.record("SCAN", pattern)?;
        let prefix = pattern.trim_end_matches('*');
        Ok(self
            .0
            .keys()
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }

    async fn info(&self) -> Result<String> {
        self.0.record("INFO", "")?;
        Ok("# Server\r\nredis_version:7.2.0\r\nconnected_clients:3\r\n".to_string())
    }
}

pub struct MockConnector {
    pub store: Arc<MockStore>,
    pub connects: AtomicUsize,
    pub refuse: AtomicBool,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _config: &ConnectionConfig) -> Result<Arc<dyn Transport>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(CacheError::ConnectionFailed("connection refused".into()));
        }
        Ok(Arc::new(MockTransport(self.store.clone())))
    }
}

pub struct Harness {
    pub client: Arc<RemoteCacheClient>,
    pub connector: Arc<MockConnector>,
    pub store: Arc<MockStore>,
    pub clock: Arc<ManualClock>,
}

pub fn settings(failure_threshold: u32) -> ClientSettings {
    ClientSettings {
        breaker: CircuitBreakerConfig {
            failure_threshold,
            cooldown: Duration::from_secs(60),
        },
        ..ClientSettings::default()
    }
}

pub fn harness_with(settings: ClientSettings) -> Harness {
    let store = MockStore::new();
    let connector = Arc::new(MockConnector {
        store: store.clone(),
        connects: AtomicUsize::new(0),
        refuse: AtomicBool::new(false),
    });
    let clock = ManualClock::new(1_700_000_000_000);

    let mut config = ConnectionConfig::new("cache.internal", 6379);
    config.retry = RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
    };

    let shared_clock: SharedClock = clock.clone();
    let client = Arc::new(RemoteCacheClient::new(
        Some(config),
        settings,
        connector.clone(),
        shared_clock,
    ));

    Harness {
        client,
        connector,
        store,
        clock,
    }
}

pub fn harness() -> Harness {
    harness_with(settings(5))
}

/// A harness whose client is connected, with the self-test traffic cleared.
pub async fn connected_harness(settings: ClientSettings) -> Harness {
    let harness = harness_with(settings);
    harness
        .client
        .connect()
        .await
        .expect("mock connection succeeds");
    harness.store.clear_calls();
    harness
}
