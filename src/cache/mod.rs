//! Cache Module
//!
//! Process-local TTL cache with hit/miss accounting.

mod entry;
mod local;
mod stats;


// Re-export public types
pub use entry::CacheEntry;
pub use local::LocalCache;
pub use stats::CacheStats;

/// Local cache shared between tasks.
pub type SharedLocalCache = std::sync::Arc<tokio::sync::RwLock<LocalCache>>;
