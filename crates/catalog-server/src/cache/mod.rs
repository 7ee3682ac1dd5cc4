//! Key/value cache in front of the record store.
//!
//! ## Backends
//!
//! - **Local (DashMap)**: per-process, expiry enforced on read
//! - **Redis**: shared across instances, expiry enforced by `SET .. EX`
//!
//! Redis mode keeps no local copy: an invalidation issued by one instance
//! must be visible to every other instance on its next read.
//!
//! If Redis is disabled or unreachable at startup, the server falls back to
//! the local backend.

pub mod backend;
pub mod policy;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use backend::{CacheBackend, CachedEntry, create_cache_backend};
pub use policy::{CacheKeyKind, CachePolicy};

/// Errors reported by a cache backend.
///
/// These never reach an HTTP client: the catalog service treats a failed
/// read as a miss and logs failed writes.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache pool error: {0}")]
    Pool(String),

    #[error("Cache command error: {0}")]
    Command(String),

    #[error("Cache call timed out after {millis}ms")]
    Timeout { millis: u64 },
}

/// Byte-oriented cache used by the catalog service.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    /// Returns the stored bytes, or `None` on a miss or expired entry.
    async fn get(&self, key: &str) -> Result<Option<Arc<Vec<u8>>>, CacheError>;

    /// Stores `value` under `key`, replacing any previous entry.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    fn backend_name(&self) -> &'static str;
}

/// Shared cache trait object.
pub type DynCacheLayer = Arc<dyn CacheLayer>;
