//! Background Tasks Module
//!
//! Contains background tasks that run periodically while the cache layer is up.
//!
//! # Tasks
//! - Local cleanup: removes expired local cache entries at configured intervals
//! - Health check: probes the remote store and feeds the circuit breaker
//! - Metrics reporter: logs aggregate remote operation metrics

mod cleanup;
mod monitors;

pub use cleanup::spawn_cleanup_task;
pub use monitors::{spawn_health_check_task, spawn_metrics_reporter, start_monitors};
