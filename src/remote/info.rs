//! Parsing of the store's INFO status report.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

/// Introspection data about the remote store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RemoteStoreInfo {
    pub version: Option<String>,
    pub uptime_seconds: Option<u64>,
    pub connected_clients: Option<u64>,
    pub used_memory: Option<u64>,
    pub used_memory_human: Option<String>,
    pub keyspace_hits: Option<u64>,
    pub keyspace_misses: Option<u64>,
    /// Key counts per dashboard namespace, filled in by SCAN
    pub namespace_keys: BTreeMap<String, usize>,
}

impl RemoteStoreInfo {
    /// Parses the `field:value` lines of an INFO report. Section headers,
    /// blank lines and unknown fields are ignored.
    pub fn parse(report: &str) -> Self {
        let fields: HashMap<&str, &str> = report
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once(':'))
            .collect();

        let text = |name: &str| fields.get(name).map(|v| v.to_string());
        let number = |name: &str| fields.get(name).and_then(|v| v.parse().ok());

        Self {
            version: text("redis_version"),
            uptime_seconds: number("uptime_in_seconds"),
            connected_clients: number("connected_clients"),
            used_memory: number("used_memory"),
            used_memory_human: text("used_memory_human"),
            keyspace_hits: number("keyspace_hits"),
            keyspace_misses: number("keyspace_misses"),
            namespace_keys: BTreeMap::new(),
        }
    }
}
