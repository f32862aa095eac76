//! Redis implementation of the helpdesk [`Cache`].
//!
//! Values are opaque bytes stored with `SET .. EX`; the key layout
//! (`ticket:{id}`, `user_tickets:{user}`, `tickets:all`) is owned by
//! [`CacheKey`](helpdesk_core::cache::CacheKey), not by this crate.
//!
//! # Example
//!
//! ```no_run
//! use helpdesk_core::cache::Cache;
//! use helpdesk_redis::RedisCache;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = RedisCache::new("redis://127.0.0.1:6379").await?;
//! cache.set("tickets:all", b"[]".to_vec(), Duration::from_secs(300)).await?;
//! cache.delete(&["tickets:all".to_string()]).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use helpdesk_core::cache::Cache;
use helpdesk_core::error::CacheError;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// `Redis`-backed [`Cache`].
///
/// This type is `Clone`; every clone shares the same `ConnectionManager`,
/// which reconnects on its own after a dropped connection.
pub struct RedisCache {
    conn_manager: ConnectionManager,
}

impl RedisCache {
    /// Connect to `redis_url`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Connection`] if the URL is malformed or the server
    /// is unreachable.
    pub async fn new(redis_url: &str) -> Result<Self, CacheError> {
        let client = Client::open(redis_url)
            .map_err(|e| CacheError::Connection(format!("Failed to create Redis client: {e}")))?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            CacheError::Connection(format!("Failed to create Redis connection manager: {e}"))
        })?;

        tracing::info!("RedisCache initialized successfully");

        Ok(Self { conn_manager })
    }

    /// Send `PING`, used by readiness checks.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Connection`] if the server does not answer.
    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn_manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;
        Ok(())
    }
}

impl Clone for RedisCache {
    fn clone(&self) -> Self {
        Self {
            conn_manager: self.conn_manager.clone(),
        }
    }
}

/// Redis rejects `EX 0`; sub-second TTLs round up to one second.
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

impl Cache for RedisCache {
    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, CacheError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let value: Option<Vec<u8>> =
                conn.get(&key).await.map_err(|e| CacheError::Operation {
                    key: key.clone(),
                    reason: e.to_string(),
                })?;
            Ok(value)
        })
    }

    fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let _: () = conn
                .set_ex(&key, value, ttl_seconds(ttl))
                .await
                .map_err(|e| CacheError::Operation {
                    key: key.clone(),
                    reason: e.to_string(),
                })?;
            Ok(())
        })
    }

    fn delete(
        &self,
        keys: &[String],
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>> {
        let keys = keys.to_vec();
        Box::pin(async move {
            if keys.is_empty() {
                return Ok(());
            }
            let mut conn = self.conn_manager.clone();
            let removed: i64 = conn.del(&keys).await.map_err(|e| CacheError::Operation {
                key: keys.join(","),
                reason: e.to_string(),
            })?;
            tracing::debug!(keys = ?keys, removed, "Cache keys deleted");
            Ok(())
        })
    }
}
