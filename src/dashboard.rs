//! Dashboard Cache Operations
//!
//! Named cache entry points used by the dashboard: KPIs, lead lists and user
//! sessions. Each one only builds a namespaced key and picks a TTL class before
//! delegating to the remote client.
//!
//! Reads never fail: any error degrades to a miss, so a cache problem only ever
//! sends the caller to the primary store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::SharedLocalCache;
use crate::clock::duration_ms;
use crate::config::TtlClasses;
use crate::error::Result;
use crate::remote::{CacheStatsReport, RemoteCacheClient, StoreOutcome};

pub const KPI_NAMESPACE: &str = "kpis";
pub const LEADS_NAMESPACE: &str = "leads";
pub const SESSION_NAMESPACE: &str = "session";

/// Every namespace the dashboard writes, for diagnostics.
pub const NAMESPACES: [&str; 3] = [KPI_NAMESPACE, LEADS_NAMESPACE, SESSION_NAMESPACE];

/// Session fields that must never reach the shared cache.
const SECRET_FIELDS: &[&str] = &[
    "token",
    "access_token",
    "refresh_token",
    "password",
    "secret",
    "api_key",
];

/// Removes secret fields from a JSON document, at any depth.
pub fn strip_secrets(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|field, _| {
                !SECRET_FIELDS
                    .iter()
                    .any(|secret| secret.eq_ignore_ascii_case(field))
            });
            map.values_mut().for_each(strip_secrets);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_secrets),
        _ => {}
    }
}

/// Dashboard-facing cache facade.
#[derive(Debug, Clone)]
pub struct DashboardCache {
    client: Arc<RemoteCacheClient>,
    ttl: TtlClasses,
    /// Optional faster, shorter-lived layer consulted before the remote store
    local: Option<SharedLocalCache>,
    /// Bumped around every invalidation; a refill read under an older epoch is dropped
    invalidations: Arc<AtomicU64>,
}

impl DashboardCache {
    pub fn new(client: Arc<RemoteCacheClient>, ttl: TtlClasses) -> Self {
        Self {
            client,
            ttl,
            local: None,
            invalidations: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Puts a local cache in front of the remote store.
    pub fn with_local_layer(mut self, local: SharedLocalCache) -> Self {
        self.local = Some(local);
        self
    }

    pub fn client(&self) -> &Arc<RemoteCacheClient> {
        &self.client
    }

    pub fn local(&self) -> Option<&SharedLocalCache> {
        self.local.as_ref()
    }

    fn key(namespace: &str, id: &str) -> String {
        format!("{}:{}", namespace, id)
    }

    // == KPIs ==

    pub async fn cache_kpis<T: Serialize + ?Sized>(
        &self,
        org_id: &str,
        kpis: &T,
    ) -> Result<StoreOutcome> {
        self.store(KPI_NAMESPACE, org_id, kpis, self.ttl.kpis).await
    }

    pub async fn get_kpis<T: DeserializeOwned>(&self, org_id: &str) -> Option<T> {
        self.fetch(KPI_NAMESPACE, org_id, self.ttl.kpis).await
    }

    // == Leads ==

    pub async fn cache_leads<T: Serialize + ?Sized>(
        &self,
        org_id: &str,
        leads: &T,
    ) -> Result<StoreOutcome> {
        self.store(LEADS_NAMESPACE, org_id, leads, self.ttl.leads).await
    }

    pub async fn get_leads<T: DeserializeOwned>(&self, org_id: &str) -> Option<T> {
        self.fetch(LEADS_NAMESPACE, org_id, self.ttl.leads).await
    }

    // == Sessions ==

    /// Stores a session with its secret fields removed.
    pub async fn cache_user_session<T: Serialize + ?Sized>(
        &self,
        user_id: &str,
        session: &T,
    ) -> Result<StoreOutcome> {
        let mut sanitized = serde_json::to_value(session)?;
        strip_secrets(&mut sanitized);
        self.store(SESSION_NAMESPACE, user_id, &sanitized, self.ttl.session)
            .await
    }

    pub async fn get_user_session<T: DeserializeOwned>(&self, user_id: &str) -> Option<T> {
        self.fetch(SESSION_NAMESPACE, user_id, self.ttl.session).await
    }

    // == Invalidation ==

    /// Deletes every remote key matching `pattern` and empties the local layer.
    ///
    /// The local layer is emptied on both sides of the remote delete, and reads
    /// that started before the delete finished do not refill it.
    pub async fn invalidate_cache(&self, pattern: &str) -> Result<u64> {
        self.clear_local().await;
        let result = self.client.delete_pattern(pattern).await;
        self.clear_local().await;
        result
    }

    async fn clear_local(&self) {
        if let Some(local) = &self.local {
            let mut local = local.write().await;
            self.invalidations.fetch_add(1, Ordering::SeqCst);
            local.clear();
        }
    }

    // == Diagnostics ==

    pub async fn cache_stats(&self) -> CacheStatsReport {
        self.client.cache_stats(&NAMESPACES).await
    }

    pub async fn perform_health_check(&self) -> bool {
        self.client.perform_health_check().await
    }

    pub async fn shutdown(&self) {
        self.client.shutdown().await
    }

    // == Helpers ==

    async fn store<T: Serialize + ?Sized>(
        &self,
        namespace: &str,
        id: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<StoreOutcome> {
        let key = Self::key(namespace, id);
        let epoch = self.invalidations.load(Ordering::SeqCst);
        let outcome = self.client.set_json(&key, value, ttl).await?;

        if let (Some(local), StoreOutcome::Stored) = (&self.local, outcome) {
            let mut local = local.write().await;
            if self.invalidations.load(Ordering::SeqCst) == epoch {
                let local_ttl = local.default_ttl_ms().min(duration_ms(ttl));
                local.set(key, serde_json::to_value(value)?, local_ttl);
            }
        }
        Ok(outcome)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        namespace: &str,
        id: &str,
        ttl: Duration,
    ) -> Option<T> {
        let key = Self::key(namespace, id);
        let epoch = self.invalidations.load(Ordering::SeqCst);

        if let Some(local) = &self.local {
            let cached = local.write().await.get(&key);
            if let Some(value) = cached {
                match serde_json::from_value(value) {
                    Ok(decoded) => return Some(decoded),
                    Err(err) => debug!(key = %key, error = %err, "Local entry has unexpected shape"),
                }
            }
        }

        let value = match self.client.get_json::<Value>(&key).await {
            Ok(Some(value)) => value,
            Ok(None) => return None,
            Err(err) => {
                warn!(key = %key, error = %err, "Cache read failed, treating as miss");
                return None;
            }
        };

        if let Some(local) = &self.local {
            let mut local = local.write().await;
            if self.invalidations.load(Ordering::SeqCst) == epoch {
                // Remote remaining TTL is unknown; the namespace TTL bounds it
                let local_ttl = local.default_ttl_ms().min(duration_ms(ttl));
                local.set(key.clone(), value.clone(), local_ttl);
            } else {
                debug!(key = %key, "Invalidated while reading, not caching locally");
            }
        }

        serde_json::from_value(value)
            .map_err(|err| warn!(key = %key, error = %err, "Cached value has unexpected shape"))
            .ok()
    }
}
