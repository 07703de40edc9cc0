//! Read-through search cache boundary.
//!
//! The contact search path caches rendered results as JSON values with a TTL.
//! Only the get/set surface lives here; what gets cached is the caller's
//! concern.
//!
//! Uses Redis `SET key value EX ttl` and plain `GET`.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;

/// Default cache entry lifetime in seconds (5 minutes).
pub const DEFAULT_TTL_SECONDS: u64 = 300;

/// Redis-backed JSON value cache with per-entry TTL.
#[derive(Clone)]
pub struct SearchCache {
    redis: ConnectionManager,
}

impl SearchCache {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    /// Fetch a cached value. Returns `None` on a miss or when the stored
    /// bytes are not valid JSON (a corrupt entry behaves like a miss).
    pub async fn get(&self, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
        let mut redis = self.redis.clone();
        let raw: Option<String> = redis.get(key).await?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(key, error = %e, "Discarding unparseable cache entry");
                Ok(None)
            }
        }
    }

    /// Store a value with a TTL in seconds.
    pub async fn set(
        &self,
        key: &str,
        value: &serde_json::Value,
        ttl_seconds: u64,
    ) -> anyhow::Result<()> {
        let mut redis = self.redis.clone();
        let raw = serde_json::to_string(value)?;

        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(raw)
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut redis)
            .await?;

        Ok(())
    }
}
