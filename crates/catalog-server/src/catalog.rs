//! Cache-aside orchestration over the record store.
//!
//! Reads consult the cache first and write through on a miss. Writes go to
//! the record store, then invalidate or refresh the affected cache keys, then
//! queue a change event.
//!
//! ## Consistency rules
//!
//! - `all_products` is invalidated in-line after every committed mutation,
//!   with up to `invalidation_attempts` tries. When all tries fail the error
//!   is logged and counted; the mutation still reports success because the
//!   store already holds the new state.
//! - `product_<id>` is refreshed with the saved value on update and removed
//!   on delete. A failed refresh falls back to removal.
//! - Cache trouble never fails a request: unreadable, undecodable or slow
//!   entries are misses.

use std::future::Future;
use std::time::Duration;

use catalog_core::{ChangeEvent, Product, ProductDraft, ProductPatch};
use catalog_storage::{DynProductStore, StorageError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheError, CachePolicy, DynCacheLayer};
use crate::config::AppConfig;
use crate::events::EventDispatcher;
use crate::metrics;

/// Errors surfaced by catalog operations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Product not found")]
    NotFound { id: String },

    #[error("Record store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Record store write failed: {0}")]
    StoreWriteFailed(String),
}

impl CatalogError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    fn read(err: StorageError) -> Self {
        Self::StoreUnavailable(err.to_string())
    }

    fn write(err: StorageError) -> Self {
        Self::StoreWriteFailed(err.to_string())
    }
}

/// Tunables of the catalog service.
#[derive(Debug, Clone, Copy)]
pub struct CatalogSettings {
    pub cache_ttl: Duration,
    pub store_timeout: Duration,
    pub cache_timeout: Duration,
    pub invalidation_attempts: u32,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            cache_ttl: CachePolicy::DEFAULT_TTL,
            store_timeout: Duration::from_secs(5),
            cache_timeout: Duration::from_millis(500),
            invalidation_attempts: 3,
        }
    }
}

impl CatalogSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            cache_ttl: cfg.cache.ttl(),
            store_timeout: Duration::from_millis(cfg.catalog.store_timeout_ms),
            cache_timeout: Duration::from_millis(cfg.catalog.cache_timeout_ms),
            invalidation_attempts: cfg.catalog.invalidation_attempts,
        }
    }
}

/// The catalog service. Cheap to clone; clones share every handle.
#[derive(Clone)]
pub struct CatalogService {
    store: DynProductStore,
    cache: DynCacheLayer,
    events: EventDispatcher,
    policy: CachePolicy,
    settings: CatalogSettings,
}

impl CatalogService {
    pub fn new(
        store: DynProductStore,
        cache: DynCacheLayer,
        events: EventDispatcher,
        settings: CatalogSettings,
    ) -> Self {
        info!(
            store = store.backend_name(),
            cache = cache.backend_name(),
            ttl_secs = settings.cache_ttl.as_secs(),
            "catalog service ready"
        );
        Self {
            store,
            cache,
            events,
            policy: CachePolicy::new(settings.cache_ttl),
            settings,
        }
    }

    /// Every product, in store order.
    pub async fn list_all(&self) -> Result<Vec<Product>, CatalogError> {
        let key = CachePolicy::COLLECTION_KEY;
        if let Some(products) = self.cached::<Vec<Product>>(key).await {
            return Ok(products);
        }

        let products = self
            .store_call(self.store.find_all())
            .await
            .map_err(CatalogError::read)?;
        self.populate(key, &products).await;
        Ok(products)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Product, CatalogError> {
        let key = CachePolicy::entity_key(id);
        if let Some(product) = self.cached::<Product>(&key).await {
            return Ok(product);
        }

        let product = self
            .store_call(self.store.find_by_id(id))
            .await
            .map_err(CatalogError::read)?
            .ok_or_else(|| CatalogError::not_found(id))?;
        self.populate(&key, &product).await;
        Ok(product)
    }

    pub async fn create(&self, draft: ProductDraft) -> Result<Product, CatalogError> {
        let product = self
            .store_call(self.store.insert(&draft))
            .await
            .map_err(CatalogError::write)?;
        debug!(id = %product.id, "product created");

        self.invalidate(CachePolicy::COLLECTION_KEY).await;
        self.events.dispatch(ChangeEvent::added(product.clone()));
        Ok(product)
    }

    pub async fn update(&self, id: &str, patch: ProductPatch) -> Result<Product, CatalogError> {
        let current = self
            .store_call(self.store.find_by_id(id))
            .await
            .map_err(CatalogError::write)?
            .ok_or_else(|| CatalogError::not_found(id))?;

        let merged = current.merged(&patch);
        let saved = self
            .store_call(self.store.save(&merged))
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    CatalogError::not_found(id)
                } else {
                    CatalogError::write(e)
                }
            })?;
        debug!(id = %saved.id, "product updated");

        self.invalidate(CachePolicy::COLLECTION_KEY).await;
        self.refresh(&CachePolicy::entity_key(id), &saved).await;
        self.events.dispatch(ChangeEvent::updated(saved.clone()));
        Ok(saved)
    }

    pub async fn delete(&self, id: &str) -> Result<(), CatalogError> {
        self.store_call(self.store.find_by_id(id))
            .await
            .map_err(CatalogError::read)?
            .ok_or_else(|| CatalogError::not_found(id))?;

        let removed = self
            .store_call(self.store.delete_by_id(id))
            .await
            .map_err(CatalogError::write)?;
        if !removed {
            // lost a race with a concurrent delete
            return Err(CatalogError::not_found(id));
        }
        debug!(id, "product deleted");

        self.invalidate(CachePolicy::COLLECTION_KEY).await;
        self.invalidate(&CachePolicy::entity_key(id)).await;
        self.events.dispatch(ChangeEvent::deleted(id));
        Ok(())
    }

    /// Readiness probe against the record store.
    pub async fn ping_store(&self) -> Result<(), CatalogError> {
        self.store_call(self.store.ping())
            .await
            .map_err(CatalogError::read)
    }

    async fn store_call<T>(
        &self,
        fut: impl Future<Output = Result<T, StorageError>>,
    ) -> Result<T, StorageError> {
        let limit = self.settings.store_timeout;
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::timeout(limit.as_millis() as u64)),
        }
    }

    async fn cache_call<T>(
        &self,
        fut: impl Future<Output = Result<T, CacheError>>,
    ) -> Result<T, CacheError> {
        let limit = self.settings.cache_timeout;
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout {
                millis: limit.as_millis() as u64,
            }),
        }
    }

    /// Cached value for `key`, or `None` on any kind of miss.
    async fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let kind = CachePolicy::kind_of(key).as_str();
        let bytes = match self.cache_call(self.cache.get(key)).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                metrics::record_cache_miss(kind);
                return None;
            }
            Err(e) => {
                warn!(key, error = %e, "cache read failed, falling back to store");
                metrics::record_cache_error("get");
                metrics::record_cache_miss(kind);
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                metrics::record_cache_hit(kind);
                Some(value)
            }
            Err(e) => {
                warn!(key, error = %e, "discarding undecodable cache entry");
                metrics::record_cache_miss(kind);
                if let Err(e) = self.cache_call(self.cache.delete(key)).await {
                    warn!(key, error = %e, "failed to remove undecodable cache entry");
                    metrics::record_cache_error("delete");
                }
                None
            }
        }
    }

    async fn store_in_cache<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(value).map_err(|e| CacheError::Command(e.to_string()))?;
        self.cache_call(self.cache.set(key, bytes, self.policy.ttl()))
            .await
    }

    /// Write-through after a read miss. Failure only costs a future miss.
    async fn populate<T: Serialize>(&self, key: &str, value: &T) {
        if let Err(e) = self.store_in_cache(key, value).await {
            warn!(key, error = %e, "cache write failed");
            metrics::record_cache_error("set");
        }
    }

    /// Overwrite an entry with known-current data, removing it if that fails.
    async fn refresh<T: Serialize>(&self, key: &str, value: &T) {
        if let Err(e) = self.store_in_cache(key, value).await {
            warn!(key, error = %e, "cache refresh failed, invalidating instead");
            metrics::record_cache_error("set");
            self.invalidate(key).await;
        }
    }

    /// Remove `key`, retrying up to the configured number of attempts.
    async fn invalidate(&self, key: &str) {
        let attempts = self.settings.invalidation_attempts.max(1);
        for attempt in 1..=attempts {
            match self.cache_call(self.cache.delete(key)).await {
                Ok(()) => {
                    debug!(key, attempt, "cache entry invalidated");
                    return;
                }
                Err(e) => {
                    warn!(key, attempt, attempts, error = %e, "cache invalidation attempt failed");
                    metrics::record_cache_error("delete");
                }
            }
        }

        error!(
            key,
            attempts, "cache invalidation failed; entry may serve stale data until it expires"
        );
        metrics::record_invalidation_failure(CachePolicy::kind_of(key).as_str());
    }
}
