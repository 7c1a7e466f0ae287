//! Resilient Remote Cache Client
//!
//! Validated, observable, fault-isolated access to the remote key-value store.
//!
//! # Connection lifecycle
//! ```text
//! Disconnected → Connecting: explicit connect() or first operation
//! Connecting   → Connected:  handshake + self-test probe pass
//! Connecting   → Disconnected: retry budget exhausted (reconnect cooldown starts)
//! Connected    → Disconnected: disconnect(), shutdown() or a dropped connection
//! ```
//!
//! Every operation runs through [`RemoteCacheClient::execute_operation`]:
//! shutdown check, pending registration, circuit breaker (with lazy connect),
//! then metrics.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::{duration_ms, system_clock, SharedClock};
use crate::config::{ClientSettings, ConnectionConfig};
use crate::error::{CacheError, Result};
use crate::remote::info::RemoteStoreInfo;
use crate::remote::metrics::{MetricsSnapshot, OperationKind, OperationMetrics};
use crate::remote::pending::{PendingOperations, ShuttingDownGuard};
use crate::remote::transport::{Connector, RedisConnector, Transport};
use crate::remote::validation::{encode_value, validate_key, validate_pattern};
use crate::resilience::{Backoff, CircuitBreaker, CircuitBreakerSnapshot};

/// Prefix of the throwaway keys written by the self-test probe.
pub const PROBE_KEY_PREFIX: &str = "health:probe:";

const PROBE_TTL: Duration = Duration::from_secs(10);

/// Where the client is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Result of a store request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOutcome {
    Stored,
    /// The value was null/absent, no network call was made
    NothingToStore,
}

/// Connection half of [`CacheStatsReport`].
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionReport {
    pub configured: bool,
    pub endpoint: Option<String>,
    pub state: ConnectionState,
    pub breaker: CircuitBreakerSnapshot,
    pub pending_operations: usize,
    pub connect_attempts: u64,
    pub shutting_down: bool,
}

/// Diagnostics snapshot returned by [`RemoteCacheClient::cache_stats`].
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsReport {
    pub connection: ConnectionReport,
    pub performance: MetricsSnapshot,
    /// `None` when the store could not be introspected
    pub remote_store: Option<RemoteStoreInfo>,
}

/// Writes a probe key, reads it back, compares, deletes it.
async fn self_test(transport: &dyn Transport) -> Result<()> {
    let key = format!("{}{}", PROBE_KEY_PREFIX, Uuid::new_v4());
    let expected = chrono::Utc::now().to_rfc3339();

    transport.set(&key, &expected, PROBE_TTL).await?;
    let read_back = transport.get(&key).await;
    // Delete even when the read failed; the probe expires anyway
    let deleted = transport.delete(std::slice::from_ref(&key)).await;

    match read_back? {
        Some(value) if value == expected => {}
        other => {
            return Err(CacheError::Remote(format!(
                "health probe read back {:?}, expected {:?}",
                other, expected
            )))
        }
    }
    deleted.map(|_| ())
}

/// Client for the remote cache. Construct once, share behind an `Arc`.
pub struct RemoteCacheClient {
    config: Option<ConnectionConfig>,
    settings: ClientSettings,
    connector: Arc<dyn Connector>,
    /// Replaced only by connect, disconnect and dropped-connection handling
    connection: RwLock<Option<Arc<dyn Transport>>>,
    state: Mutex<ConnectionState>,
    connect_lock: tokio::sync::Mutex<()>,
    /// Clock reading when the retry budget last ran out
    gave_up_at: Mutex<Option<u64>>,
    breaker: CircuitBreaker,
    metrics: OperationMetrics,
    pending: PendingOperations,
    shutting_down: AtomicBool,
    closed: AtomicBool,
    connect_attempts: AtomicU64,
    timers: Mutex<Vec<JoinHandle<()>>>,
    clock: SharedClock,
}

impl std::fmt::Debug for RemoteCacheClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCacheClient")
            .field("config", &self.config)
            .field("state", &self.connection_state())
            .field("breaker", &self.breaker.state())
            .field("pending", &self.pending.len())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl RemoteCacheClient {
    /// Creates a Redis-backed client. `None` config yields a degraded client
    /// whose remote operations fail with [`CacheError::ConfigurationAbsent`].
    pub fn create(config: Option<ConnectionConfig>, settings: ClientSettings) -> Arc<Self> {
        Arc::new(Self::new(
            config,
            settings,
            Arc::new(RedisConnector),
            system_clock(),
        ))
    }

    pub fn new(
        config: Option<ConnectionConfig>,
        settings: ClientSettings,
        connector: Arc<dyn Connector>,
        clock: SharedClock,
    ) -> Self {
        match &config {
            Some(conn) => info!(endpoint = %conn.redacted_endpoint(), "Remote cache configured"),
            None => warn!("No remote cache configured, running in degraded mode"),
        }

        let breaker =
            CircuitBreaker::with_clock("remote-cache", settings.breaker.clone(), clock.clone());

        Self {
            config,
            settings,
            connector,
            connection: RwLock::new(None),
            state: Mutex::new(ConnectionState::Disconnected),
            connect_lock: tokio::sync::Mutex::new(()),
            gave_up_at: Mutex::new(None),
            breaker,
            metrics: OperationMetrics::new(),
            pending: PendingOperations::new(),
            shutting_down: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            connect_attempts: AtomicU64::new(0),
            timers: Mutex::new(Vec::new()),
            clock,
        }
    }

    // == Accessors ==

    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn connection_state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn pending_operations(&self) -> usize {
        self.pending.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst) || self.closed.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: ConnectionState) {
        let mut current = lock(&self.state);
        if *current != state {
            debug!(from = ?*current, to = ?state, "Connection state change");
            *current = state;
        }
    }

    fn in_reconnect_cooldown(&self) -> bool {
        match *lock(&self.gave_up_at) {
            Some(at) => {
                self.clock.now_ms().saturating_sub(at)
                    < duration_ms(self.settings.reconnect_cooldown)
            }
            None => false,
        }
    }

    async fn current_transport(&self) -> Option<Arc<dyn Transport>> {
        self.connection.read().await.clone()
    }

    // == Lifecycle ==

    /// Connects with exponential backoff, then runs the self-test probe.
    ///
    /// No-op when already connected. Concurrent callers share one attempt.
    pub async fn connect(&self) -> Result<()> {
        let config = self.config.as_ref().ok_or(CacheError::ConfigurationAbsent)?;
        if self.closed.load(Ordering::SeqCst) {
            return Err(CacheError::ShuttingDown);
        }

        let _connecting = self.connect_lock.lock().await;
        if self.current_transport().await.is_some() {
            return Ok(());
        }

        self.set_state(ConnectionState::Connecting);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            self.connect_attempts.fetch_add(1, Ordering::Relaxed);
            info!(attempt, endpoint = %config.redacted_endpoint(), "Connecting to remote cache");

            let err = match self.connect_once(config).await {
                Ok(transport) => {
                    self.install(transport).await;
                    info!(attempt, "Remote cache connected and self-test passed");
                    return Ok(());
                }
                Err(err) => err,
            };

            match config.retry.next_delay(attempt) {
                Backoff::Retry(delay) if !self.closed.load(Ordering::SeqCst) => {
                    warn!(
                        attempt,
                        delay_ms = duration_ms(delay),
                        error = %err,
                        "Remote cache connection attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Backoff::Retry(_) => {
                    self.set_state(ConnectionState::Disconnected);
                    return Err(CacheError::ShuttingDown);
                }
                Backoff::GiveUp => {
                    *lock(&self.gave_up_at) = Some(self.clock.now_ms());
                    self.set_state(ConnectionState::Disconnected);
                    error!(attempts = attempt, error = %err, "Giving up on remote cache connection");
                    return Err(CacheError::ConnectionFailed(format!(
                        "gave up after {} attempts: {}",
                        attempt, err
                    )));
                }
            }
        }
    }

    /// A single connect attempt, handshake and self-test included, bounded by
    /// the connect timeout. Returns `NotAvailable` at once if another connect
    /// is already running.
    async fn reconnect_once(&self) -> Result<()> {
        let config = self.config.as_ref().ok_or(CacheError::ConfigurationAbsent)?;
        let Ok(_connecting) = self.connect_lock.try_lock() else {
            return Err(CacheError::NotAvailable);
        };
        if self.current_transport().await.is_some() {
            return Ok(());
        }

        self.set_state(ConnectionState::Connecting);
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
        let attempt = tokio::time::timeout(config.connect_timeout, self.connect_once(config))
            .await
            .unwrap_or_else(|_| {
                Err(CacheError::Timeout(format!(
                    "reconnect did not complete within {}ms",
                    duration_ms(config.connect_timeout)
                )))
            });

        match attempt {
            Ok(transport) => {
                self.install(transport).await;
                info!("Remote cache reconnected by health check");
                Ok(())
            }
            Err(err) => {
                self.set_state(ConnectionState::Disconnected);
                Err(err)
            }
        }
    }

    async fn install(&self, transport: Arc<dyn Transport>) {
        *self.connection.write().await = Some(transport);
        *lock(&self.gave_up_at) = None;
        self.set_state(ConnectionState::Connected);
    }

    async fn connect_once(&self, config: &ConnectionConfig) -> Result<Arc<dyn Transport>> {
        let transport = tokio::time::timeout(config.connect_timeout, self.connector.connect(config))
            .await
            .map_err(|_| {
                CacheError::Timeout(format!(
                    "connect did not complete within {}ms",
                    config.connect_timeout.as_millis()
                ))
            })??;

        if let Err(err) = self_test(transport.as_ref()).await {
            let _ = transport.close().await;
            return Err(err);
        }
        Ok(transport)
    }

    /// Waits for in-flight operations, then closes the connection.
    ///
    /// New operations are rejected with [`CacheError::ShuttingDown`] for the
    /// duration; the flag is cleared again on every exit path.
    pub async fn disconnect(&self) -> Result<()> {
        let _flag = ShuttingDownGuard::acquire(&self.shutting_down)?;
        self.drain().await;
        self.close_connection().await;
        Ok(())
    }

    async fn drain(&self) {
        let pending = self.pending.len();
        if pending > 0 {
            info!(pending, "Waiting for in-flight cache operations");
        }
        match self.settings.shutdown_timeout {
            Some(bound) => {
                if tokio::time::timeout(bound, self.pending.wait_drained())
                    .await
                    .is_err()
                {
                    warn!(
                        pending = self.pending.len(),
                        timeout_ms = duration_ms(bound),
                        "In-flight cache operations did not drain in time"
                    );
                }
            }
            None => self.pending.wait_drained().await,
        }
    }

    async fn close_connection(&self) {
        let transport = self.connection.write().await.take();
        if let Some(transport) = transport {
            if let Err(err) = transport.close().await {
                warn!(error = %err, "Error while closing remote cache connection");
            }
            info!("Remote cache connection closed");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    async fn handle_connection_lost(&self, reason: &str) {
        let lost = self.connection.write().await.take();
        if lost.is_some() {
            warn!(reason, "Remote cache connection lost");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Returns the live transport, lazily connecting when allowed.
    async fn transport(&self) -> Result<Arc<dyn Transport>> {
        if let Some(transport) = self.current_transport().await {
            return Ok(transport);
        }
        if self.in_reconnect_cooldown() {
            return Err(CacheError::NotAvailable);
        }
        if let Err(err) = self.connect().await {
            debug!(error = %err, "Lazy connect failed");
        }
        self.current_transport().await.ok_or(CacheError::NotAvailable)
    }

    /// Stops timers, drains, closes. Further operations fail with
    /// [`CacheError::ShuttingDown`]. Calling it again is a no-op.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down remote cache client");

        self.drain().await;

        let timers: Vec<JoinHandle<()>> = lock(&self.timers).drain(..).collect();
        for timer in &timers {
            timer.abort();
        }
        debug!(stopped = timers.len(), "Cache timers stopped");

        self.close_connection().await;
        info!("Remote cache client shut down");
    }

    /// Keeps a background task alive until shutdown, which aborts it.
    pub fn register_timer(&self, handle: JoinHandle<()>) {
        if self.closed.load(Ordering::SeqCst) {
            handle.abort();
            return;
        }
        lock(&self.timers).push(handle);
    }

    // == Operation wrapper ==

    /// Runs `op` against the store with shutdown, pending-set, breaker and
    /// metrics handling.
    pub async fn execute_operation<T, F, Fut>(&self, kind: OperationKind, op: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn Transport>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.is_shutting_down() {
            return Err(CacheError::ShuttingDown);
        }
        if self.config.is_none() {
            return Err(CacheError::ConfigurationAbsent);
        }

        // Register before checking again so shutdown cannot miss this operation
        let _pending = self.pending.register();
        if self.is_shutting_down() {
            return Err(CacheError::ShuttingDown);
        }

        let started = Instant::now();
        let result = self
            .breaker
            .execute(|| async {
                let transport = self.transport().await?;
                let result = op(transport).await;
                if let Err(CacheError::ConnectionFailed(reason)) = &result {
                    self.handle_connection_lost(reason).await;
                }
                result
            })
            .await;

        self.metrics.record(started.elapsed(), result.is_ok());
        if let Err(err) = &result {
            debug!(operation = kind.as_str(), error = %err, "Remote cache operation failed");
        }
        result
    }

    // == Primitive operations ==

    /// Reads and decodes a JSON value. `Ok(None)` is a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        validate_key(key, self.settings.max_key_length)?;

        let raw = self
            .execute_operation(OperationKind::Get, |t| async move { t.get(key).await })
            .await?;

        match raw {
            Some(raw) => {
                self.metrics.record_hit();
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => {
                self.metrics.record_miss();
                Ok(None)
            }
        }
    }

    /// Encodes and stores a value. Null values store nothing and skip the network.
    pub async fn set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<StoreOutcome> {
        validate_key(key, self.settings.max_key_length)?;
        let Some(encoded) = encode_value(value, self.settings.max_value_bytes)? else {
            return Ok(StoreOutcome::NothingToStore);
        };

        self.execute_operation(OperationKind::Set, |t| async move {
            t.set(key, &encoded, ttl).await
        })
        .await?;
        Ok(StoreOutcome::Stored)
    }

    /// Removes one key, reporting whether it existed.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        validate_key(key, self.settings.max_key_length)?;

        let keys = vec![key.to_string()];
        let removed = self
            .execute_operation(OperationKind::Delete, |t| async move {
                t.delete(&keys).await
            })
            .await?;
        Ok(removed > 0)
    }

    /// Removes every key matching a glob pattern.
    pub async fn delete_pattern(&self, pattern: &str) -> Result<u64> {
        validate_pattern(pattern, self.settings.max_key_length)?;

        let removed = self
            .execute_operation(OperationKind::Invalidate, |t| async move {
                let keys = t.scan(pattern).await?;
                t.delete(&keys).await
            })
            .await?;
        info!(pattern, removed, "Cache invalidated");
        Ok(removed)
    }

    // == Health ==

    /// Runs the self-test probe. The outcome feeds the breaker, so sustained
    /// probe failures alone can open it.
    ///
    /// While disconnected (and outside the reconnect cooldown) this makes one
    /// bounded reconnect attempt instead, so it never sits in the retry loop.
    pub async fn perform_health_check(&self) -> bool {
        if self.config.is_none() || self.is_shutting_down() {
            return false;
        }
        let _pending = self.pending.register();
        if self.is_shutting_down() {
            return false;
        }

        let started = Instant::now();
        let result = match self.current_transport().await {
            Some(transport) => self_test(transport.as_ref()).await,
            None if self.in_reconnect_cooldown() => Err(CacheError::NotAvailable),
            None => self.reconnect_once().await,
        };
        self.metrics.record(started.elapsed(), result.is_ok());

        match result {
            Ok(()) => {
                self.breaker.record_success();
                debug!("Remote cache health check passed");
                true
            }
            Err(err) => {
                self.breaker.record_failure();
                if let CacheError::ConnectionFailed(reason) = &err {
                    self.handle_connection_lost(reason).await;
                }
                warn!(error = %err, "Remote cache health check failed");
                false
            }
        }
    }

    // == Diagnostics ==

    /// Combined connection, performance and store snapshot.
    ///
    /// `namespaces` are key prefixes (e.g. `"kpis"`) whose key counts are
    /// gathered with SCAN. Store introspection failures leave `remote_store` empty.
    pub async fn cache_stats(&self, namespaces: &[&str]) -> CacheStatsReport {
        let remote_store = if self.is_configured() && !self.is_shutting_down() {
            self.execute_operation(OperationKind::Info, |t| async move {
                let mut info = RemoteStoreInfo::parse(&t.info().await?);
                for ns in namespaces {
                    let keys = t.scan(&format!("{}:*", ns)).await?;
                    info.namespace_keys.insert(ns.to_string(), keys.len());
                }
                Ok(info)
            })
            .await
            .map_err(|err| debug!(error = %err, "Remote store introspection failed"))
            .ok()
        } else {
            None
        };

        CacheStatsReport {
            connection: ConnectionReport {
                configured: self.is_configured(),
                endpoint: self.config.as_ref().map(ConnectionConfig::redacted_endpoint),
                state: self.connection_state(),
                breaker: self.breaker.snapshot(),
                pending_operations: self.pending.len(),
                connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
                shutting_down: self.is_shutting_down(),
            },
            performance: self.metrics.snapshot(),
            remote_store,
        }
    }
}
