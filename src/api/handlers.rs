//! API Handlers
//!
//! HTTP request handlers for the diagnostics endpoints.

use axum::{extract::State, http::StatusCode, Json};

use crate::cache::{LocalCache, SharedLocalCache};
use crate::config::Config;
use crate::dashboard::DashboardCache;
use crate::error::{CacheError, Result};
use crate::models::{HealthResponse, InvalidateRequest, InvalidateResponse, StatsResponse};
use crate::remote::RemoteCacheClient;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Dashboard cache facade over the remote client
    pub cache: DashboardCache,
    /// Local cache layer, also swept by the cleanup task
    pub local: SharedLocalCache,
}

impl AppState {
    /// Creates a new AppState; the local cache is installed as the facade's front layer.
    pub fn new(cache: DashboardCache, local: LocalCache) -> Self {
        let local: SharedLocalCache = std::sync::Arc::new(tokio::sync::RwLock::new(local));
        Self {
            cache: cache.with_local_layer(local.clone()),
            local,
        }
    }

    /// Creates a new AppState from configuration.
    pub fn from_config(config: &Config) -> Self {
        let client = RemoteCacheClient::create(config.connection.clone(), config.client.clone());
        Self::new(
            DashboardCache::new(client, config.ttl),
            LocalCache::new(config.local_ttl_ms),
        )
    }
}

/// Handler for GET /health
///
/// 200 when the remote probe passes, 503 otherwise, so orchestrators can use
/// it as a liveness check.
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let healthy = state.cache.perform_health_check().await;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let configured = state.cache.client().is_configured();

    (status, Json(HealthResponse::new(healthy, configured)))
}

/// Handler for GET /stats
///
/// Returns remote diagnostics together with local cache statistics.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let remote = state.cache.cache_stats().await;
    let local = state.local.read().await.stats();

    Json(StatsResponse {
        remote,
        local: local.into(),
    })
}

/// Handler for POST /invalidate
///
/// Deletes every key matching the pattern.
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateRequest>,
) -> Result<Json<InvalidateResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidKey(error_msg));
    }

    let removed = state.cache.invalidate_cache(&req.pattern).await?;

    Ok(Json(InvalidateResponse {
        pattern: req.pattern,
        removed,
    }))
}
