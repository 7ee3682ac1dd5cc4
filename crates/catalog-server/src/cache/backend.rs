//! Cache backends: process-local DashMap or shared Redis.

use async_trait::async_trait;
use dashmap::DashMap;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{CacheError, CacheLayer};
use crate::config::RedisConfig;

/// A cached entry with TTL support.
///
/// The data is wrapped in `Arc` so hits are cheap to hand out.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub data: Arc<Vec<u8>>,
    pub cached_at: Instant,
    pub ttl: Duration,
}

impl CachedEntry {
    pub fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data: Arc::new(data),
            cached_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }
}

#[derive(Clone)]
pub enum CacheBackend {
    /// Single-instance: local DashMap only
    Local(Arc<DashMap<String, CachedEntry>>),

    /// Multi-instance: Redis only
    Redis(Pool),
}

impl CacheBackend {
    pub fn new_local() -> Self {
        CacheBackend::Local(Arc::new(DashMap::new()))
    }

    pub fn new_redis(redis_pool: Pool) -> Self {
        CacheBackend::Redis(redis_pool)
    }

    /// Number of locally held entries (expired ones included until read).
    /// Always 0 in Redis mode.
    pub fn local_len(&self) -> usize {
        match self {
            CacheBackend::Local(map) => map.len(),
            CacheBackend::Redis(_) => 0,
        }
    }

    async fn redis_conn(pool: &Pool) -> Result<deadpool_redis::Connection, CacheError> {
        pool.get().await.map_err(|e| CacheError::Pool(e.to_string()))
    }
}

#[async_trait]
impl CacheLayer for CacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Arc<Vec<u8>>>, CacheError> {
        match self {
            CacheBackend::Local(map) => {
                let Some(entry) = map.get(key) else {
                    return Ok(None);
                };
                if entry.is_expired() {
                    drop(entry);
                    map.remove_if(key, |_, e| e.is_expired());
                    return Ok(None);
                }
                Ok(Some(Arc::clone(&entry.data)))
            }
            CacheBackend::Redis(redis) => {
                let mut conn = Self::redis_conn(redis).await?;
                let data = conn
                    .get::<_, Option<Vec<u8>>>(key)
                    .await
                    .map_err(|e| CacheError::Command(e.to_string()))?;
                tracing::trace!(key = %key, hit = data.is_some(), "Redis GET");
                Ok(data.map(Arc::new))
            }
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        match self {
            CacheBackend::Local(map) => {
                map.insert(key.to_string(), CachedEntry::new(value, ttl));
                Ok(())
            }
            CacheBackend::Redis(redis) => {
                let mut conn = Self::redis_conn(redis).await?;
                // EX 0 is rejected by Redis
                let ttl_secs = ttl.as_secs().max(1);
                conn.set_ex::<_, _, ()>(key, value, ttl_secs)
                    .await
                    .map_err(|e| CacheError::Command(e.to_string()))?;
                tracing::trace!(key = %key, ttl_secs, "Redis SET");
                Ok(())
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        match self {
            CacheBackend::Local(map) => {
                map.remove(key);
                Ok(())
            }
            CacheBackend::Redis(redis) => {
                let mut conn = Self::redis_conn(redis).await?;
                conn.del::<_, ()>(key)
                    .await
                    .map_err(|e| CacheError::Command(e.to_string()))?;
                tracing::trace!(key = %key, "Redis DEL");
                Ok(())
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        match self {
            CacheBackend::Local(_) => "local",
            CacheBackend::Redis(_) => "redis",
        }
    }
}

/// Build the cache backend from configuration.
///
/// Falls back to the local backend when Redis is disabled, the pool cannot
/// be created, or the first connection fails.
pub async fn create_cache_backend(config: &RedisConfig) -> CacheBackend {
    if !config.enabled {
        tracing::info!("Redis disabled, using local cache only");
        return CacheBackend::new_local();
    }

    let url = config.connection_url();
    tracing::info!(host = %config.host, port = config.port, "Connecting to Redis");

    match create_redis_pool(&url, config.pool_size, config.timeout_ms) {
        Ok(pool) => match pool.get().await {
            Ok(_) => {
                tracing::info!("Connected to Redis cache");
                CacheBackend::new_redis(pool)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Failed to connect to Redis. Falling back to local cache."
                );
                CacheBackend::new_local()
            }
        },
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to create Redis pool. Falling back to local cache."
            );
            CacheBackend::new_local()
        }
    }
}

/// Create a deadpool Redis pool with the given size and timeouts.
pub(crate) fn create_redis_pool(
    url: &str,
    pool_size: usize,
    timeout_ms: u64,
) -> Result<Pool, deadpool_redis::CreatePoolError> {
    let mut redis_config = deadpool_redis::Config::from_url(url);
    let timeout = Some(Duration::from_millis(timeout_ms));
    let mut pool_config = deadpool_redis::PoolConfig::new(pool_size);
    pool_config.timeouts.wait = timeout;
    pool_config.timeouts.create = timeout;
    pool_config.timeouts.recycle = timeout;
    redis_config.pool = Some(pool_config);

    redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1))
}
