//! Remote Cache Monitors
//!
//! Periodic health probe and metrics reporter for the remote client. Both are
//! registered with the client so `shutdown()` stops them.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::remote::RemoteCacheClient;

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval_at(
        tokio::time::Instant::now() + period,
        period.max(Duration::from_millis(1)),
    );
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Runs the self-test probe every `period`.
///
/// Probe results feed the circuit breaker; while disconnected the probe doubles
/// as the automatic reconnect once the reconnect cooldown has passed.
pub fn spawn_health_check_task(client: Arc<RemoteCacheClient>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = period.as_secs(), "Starting remote cache health checks");
        let mut ticks = ticker(period);
        loop {
            ticks.tick().await;
            let healthy = client.perform_health_check().await;
            debug!(healthy, "Periodic remote cache health check");
        }
    })
}

/// Logs aggregate operation metrics every `period`. Reporting only.
pub fn spawn_metrics_reporter(client: Arc<RemoteCacheClient>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = ticker(period);
        loop {
            ticks.tick().await;
            let snapshot = client.metrics();
            info!(
                total_ops = snapshot.total_ops,
                success_rate = %format!("{:.1}%", snapshot.success_rate * 100.0),
                hit_rate = %format!("{:.1}%", snapshot.hit_rate * 100.0),
                avg_latency_ms = snapshot.avg_latency_ms,
                breaker = ?client.breaker().state(),
                "Remote cache metrics"
            );
        }
    })
}

/// Starts both monitors and hands them to the client for shutdown.
pub fn start_monitors(client: &Arc<RemoteCacheClient>) {
    let settings = client.settings().clone();
    client.register_timer(spawn_health_check_task(
        client.clone(),
        settings.health_check_interval,
    ));
    client.register_timer(spawn_metrics_reporter(
        client.clone(),
        settings.metrics_interval,
    ));
}
