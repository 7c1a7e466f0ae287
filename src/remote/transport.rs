//! Transport seam between the client and the key-value store.
//!
//! [`Connector`] establishes a connection, [`Transport`] issues commands on it.
//! The Redis implementation uses a multiplexed async connection; the client
//! owns reconnect policy, so nothing here reconnects on its own.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use tracing::debug;

use crate::clock::duration_ms;
use crate::config::ConnectionConfig;
use crate::error::Result;

/// Commands the client needs from the store.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Deletes the given keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64>;

    /// All keys matching a glob pattern (non-blocking iteration).
    async fn scan(&self, pattern: &str) -> Result<Vec<String>>;

    /// The store's raw status report.
    async fn info(&self) -> Result<String>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Opens transports from a [`ConnectionConfig`].
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Transport>>;
}

// == Redis ==

/// Connects to Redis (or any RESP-compatible store).
#[derive(Debug, Default, Clone, Copy)]
pub struct RedisConnector;

fn connection_info(config: &ConnectionConfig) -> ConnectionInfo {
    let addr = if config.use_tls {
        ConnectionAddr::TcpTls {
            host: config.host.clone(),
            port: config.port,
            insecure: false,
            tls_params: None,
        }
    } else {
        ConnectionAddr::Tcp(config.host.clone(), config.port)
    };

    ConnectionInfo {
        addr,
        redis: RedisConnectionInfo {
            db: config.database,
            username: config.username.clone(),
            password: config.password.clone(),
            ..Default::default()
        },
    }
}

#[async_trait]
impl Connector for RedisConnector {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Transport>> {
        let client = redis::Client::open(connection_info(config))?;
        let connection = client.get_multiplexed_async_connection().await?;
        debug!(endpoint = %config.redacted_endpoint(), "Redis connection established");
        Ok(Arc::new(RedisTransport { connection }))
    }
}

/// Redis-backed transport over a multiplexed connection.
#[derive(Clone)]
pub struct RedisTransport {
    connection: MultiplexedConnection,
}

impl std::fmt::Debug for RedisTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisTransport")
            .field("connection", &"MultiplexedConnection")
            .finish()
    }
}

#[async_trait]
impl Transport for RedisTransport {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        let ttl_ms = duration_ms(ttl).max(1);
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection.clone();
        let removed: u64 = redis::cmd("DEL").arg(keys).query_async(&mut conn).await?;
        Ok(removed)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.connection.clone();
        let mut found = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            found.extend(keys);

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(found)
    }

    async fn info(&self) -> Result<String> {
        let mut conn = self.connection.clone();
        let report: String = redis::cmd("INFO").query_async(&mut conn).await?;
        Ok(report)
    }
}
