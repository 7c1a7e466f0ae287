//! Dashboard Cache - resilient caching layer for the reporting dashboard
//!
//! A remote key-value store client with a circuit breaker, reconnect backoff,
//! validation and graceful shutdown, a process-local TTL cache in front of it,
//! and a small HTTP diagnostics surface.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod models;
pub mod remote;
pub mod resilience;
pub mod tasks;

pub use api::AppState;
pub use config::Config;
pub use dashboard::DashboardCache;
pub use error::{CacheError, Result};
pub use remote::RemoteCacheClient;
pub use tasks::{spawn_cleanup_task, start_monitors};
