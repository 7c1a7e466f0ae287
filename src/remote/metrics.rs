//! Operation telemetry for the remote client.
//!
//! Process-wide, monotonically increasing counters. The runtime is
//! multi-threaded, so every counter is an atomic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::clock::duration_ms;

/// What a remote operation was doing, for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Get,
    Set,
    Delete,
    Invalidate,
    HealthCheck,
    Info,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Get => "get",
            OperationKind::Set => "set",
            OperationKind::Delete => "delete",
            OperationKind::Invalidate => "invalidate",
            OperationKind::HealthCheck => "health_check",
            OperationKind::Info => "info",
        }
    }
}

/// Running aggregate of every remote operation.
#[derive(Debug, Default)]
pub struct OperationMetrics {
    total_ops: AtomicU64,
    success_ops: AtomicU64,
    failed_ops: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    total_latency_ms: AtomicU64,
}

/// Point-in-time copy of [`OperationMetrics`] with derived rates.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_ops: u64,
    pub success_ops: u64,
    pub failed_ops: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub total_latency_ms: u64,
    pub success_rate: f64,
    pub hit_rate: f64,
    pub avg_latency_ms: f64,
}

impl OperationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one finished operation.
    pub fn record(&self, latency: Duration, success: bool) {
        self.total_ops.fetch_add(1, Ordering::Relaxed);
        if success {
            self.success_ops.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_ops.fetch_add(1, Ordering::Relaxed);
        }
        self.total_latency_ms
            .fetch_add(duration_ms(latency), Ordering::Relaxed);
    }

    pub fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total_ops = self.total_ops.load(Ordering::Relaxed);
        let success_ops = self.success_ops.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.cache_misses.load(Ordering::Relaxed);
        let total_latency_ms = self.total_latency_ms.load(Ordering::Relaxed);

        let ratio = |num: u64, den: u64| if den == 0 { 0.0 } else { num as f64 / den as f64 };

        MetricsSnapshot {
            total_ops,
            success_ops,
            failed_ops: self.failed_ops.load(Ordering::Relaxed),
            cache_hits,
            cache_misses,
            total_latency_ms,
            success_rate: ratio(success_ops, total_ops),
            hit_rate: ratio(cache_hits, cache_hits + cache_misses),
            avg_latency_ms: ratio(total_latency_ms, total_ops),
        }
    }
}
