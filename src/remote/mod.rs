//! Remote Cache Module
//!
//! Resilient client for the shared key-value store: transport seam, validation,
//! telemetry, pending-operation tracking and the client itself.

mod client;
mod info;
mod metrics;
mod pending;
mod transport;
mod validation;

pub use client::{
    CacheStatsReport, ConnectionReport, ConnectionState, RemoteCacheClient, StoreOutcome,
    PROBE_KEY_PREFIX,
};
pub use info::RemoteStoreInfo;
pub use metrics::{MetricsSnapshot, OperationKind, OperationMetrics};
pub use pending::{PendingGuard, PendingOperations, ShuttingDownGuard};
pub use transport::{Connector, RedisConnector, RedisTransport, Transport};
pub use validation::{encode_value, validate_key, validate_pattern};
