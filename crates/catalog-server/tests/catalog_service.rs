//! Cache-aside behaviour of the catalog service, driven through instrumented
//! store, cache and publisher doubles.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use catalog_core::{ChangeEvent, Product, ProductDraft, ProductPatch};
use catalog_db_memory::InMemoryProductStore;
use catalog_server::cache::DynCacheLayer;
use catalog_server::events::EventWorker;
use catalog_server::{
    CacheBackend, CacheError, CacheLayer, CatalogError, CatalogService, CatalogSettings,
    EventDispatcher, EventPublisher, PublishError,
};
use catalog_storage::{ProductStore, StorageError};
use tokio::task::JoinHandle;

// ---- doubles ----

/// In-memory store that counts calls and can be switched into failure.
#[derive(Default)]
struct CountingStore {
    inner: InMemoryProductStore,
    reads: AtomicUsize,
    writes: AtomicUsize,
    failing: AtomicBool,
    /// Report every delete as "already gone"
    lose_delete_race: AtomicBool,
}

impl CountingStore {
    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn fail(&self, on: bool) {
        self.failing.store(on, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StorageError::connection_error("store is down"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ProductStore for CountingStore {
    async fn insert(&self, draft: &ProductDraft) -> Result<Product, StorageError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.insert(draft).await
    }

    async fn find_all(&self) -> Result<Vec<Product>, StorageError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.find_all().await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Product>, StorageError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.find_by_id(id).await
    }

    async fn save(&self, product: &Product) -> Result<Product, StorageError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.save(product).await
    }

    async fn delete_by_id(&self, id: &str) -> Result<bool, StorageError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        if self.lose_delete_race.load(Ordering::SeqCst) {
            self.inner.delete_by_id(id).await?;
            return Ok(false);
        }
        self.inner.delete_by_id(id).await
    }

    fn backend_name(&self) -> &'static str {
        "counting"
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CacheMode {
    Healthy,
    /// Every call errors
    Broken,
    /// Every call hangs
    Hanging,
}

/// Local cache whose behaviour can be switched at runtime.
struct ScriptedCache {
    inner: CacheBackend,
    mode: Mutex<CacheMode>,
    deletes: AtomicUsize,
    sets: AtomicUsize,
}

impl ScriptedCache {
    fn new() -> Self {
        Self {
            inner: CacheBackend::new_local(),
            mode: Mutex::new(CacheMode::Healthy),
            deletes: AtomicUsize::new(0),
            sets: AtomicUsize::new(0),
        }
    }

    fn set_mode(&self, mode: CacheMode) {
        *self.mode.lock().unwrap() = mode;
    }

    async fn gate(&self) -> Result<(), CacheError> {
        let mode = *self.mode.lock().unwrap();
        match mode {
            CacheMode::Healthy => Ok(()),
            CacheMode::Broken => Err(CacheError::Command("cache is down".into())),
            CacheMode::Hanging => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }

    async fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.inner
            .get(key)
            .await
            .unwrap()
            .map(|bytes| Vec::clone(&bytes))
    }
}

#[async_trait]
impl CacheLayer for ScriptedCache {
    async fn get(&self, key: &str) -> Result<Option<Arc<Vec<u8>>>, CacheError> {
        self.gate().await?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        self.inner.delete(key).await
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }
}

#[derive(Default)]
struct RecordingPublisher {
    payloads: Mutex<Vec<String>>,
    failing: AtomicBool,
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, _topic: &str, payload: &str) -> Result<(), PublishError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PublishError::Publish("broker is down".into()));
        }
        self.payloads.lock().unwrap().push(payload.to_string());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

impl RecordingPublisher {
    fn events(&self) -> Vec<ChangeEvent> {
        self.payloads
            .lock()
            .unwrap()
            .iter()
            .map(|p| ChangeEvent::from_payload(p).unwrap())
            .collect()
    }
}

struct Harness {
    service: CatalogService,
    store: Arc<CountingStore>,
    cache: Arc<ScriptedCache>,
    publisher: Arc<RecordingPublisher>,
    worker: JoinHandle<()>,
}

fn settings() -> CatalogSettings {
    CatalogSettings {
        cache_ttl: Duration::from_secs(3600),
        store_timeout: Duration::from_secs(2),
        cache_timeout: Duration::from_millis(50),
        invalidation_attempts: 3,
    }
}

fn harness() -> Harness {
    let store = Arc::new(CountingStore::default());
    let cache = Arc::new(ScriptedCache::new());
    let publisher = Arc::new(RecordingPublisher::default());
    let (events, worker): (EventDispatcher, EventWorker) = EventDispatcher::new(
        publisher.clone(),
        "product-events",
        64,
        Duration::from_secs(1),
    );
    let worker = tokio::spawn(worker.run());
    let dyn_cache: DynCacheLayer = cache.clone();
    let service = CatalogService::new(store.clone(), dyn_cache, events, settings());
    Harness {
        service,
        store,
        cache,
        publisher,
        worker,
    }
}

impl Harness {
    /// Drop the service and wait for every queued event to be published.
    async fn flush_events(self) -> Arc<RecordingPublisher> {
        let Harness {
            service,
            publisher,
            worker,
            ..
        } = self;
        drop(service);
        worker.await.unwrap();
        publisher
    }
}

// ---- reads ----

#[tokio::test]
async fn list_hit_skips_the_store() {
    let h = harness();
    h.service
        .create(ProductDraft::new("Widget", 9.99))
        .await
        .unwrap();

    let first = h.service.list_all().await.unwrap();
    let reads_after_miss = h.store.reads();
    let second = h.service.list_all().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(h.store.reads(), reads_after_miss);
}

#[tokio::test]
async fn get_is_written_through() {
    let h = harness();
    let created = h
        .service
        .create(ProductDraft::new("Lamp", 20.0))
        .await
        .unwrap();

    assert_eq!(h.service.get_by_id(&created.id).await.unwrap(), created);
    let reads = h.store.reads();
    assert_eq!(h.service.get_by_id(&created.id).await.unwrap(), created);
    assert_eq!(h.store.reads(), reads);

    let raw = h.cache.raw(&format!("product_{}", created.id)).await.unwrap();
    assert_eq!(serde_json::from_slice::<Product>(&raw).unwrap(), created);
}

#[tokio::test]
async fn missing_product_leaves_no_cache_entry() {
    let h = harness();
    let err = h.service.get_by_id("missing").await.unwrap_err();
    assert!(matches!(err, CatalogError::NotFound { .. }));
    assert_eq!(h.cache.raw("product_missing").await, None);
    assert_eq!(h.cache.sets.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn corrupt_collection_entry_is_refetched() {
    let h = harness();
    h.service.create(ProductDraft::new("A", 1.0)).await.unwrap();
    h.cache
        .inner
        .set("all_products", b"[{broken".to_vec(), Duration::from_secs(60))
        .await
        .unwrap();

    let reads = h.store.reads();
    let products = h.service.list_all().await.unwrap();
    assert_eq!(products.len(), 1);
    assert_eq!(h.store.reads(), reads + 1);

    let raw = h.cache.raw("all_products").await.unwrap();
    assert_eq!(
        serde_json::from_slice::<Vec<Product>>(&raw).unwrap(),
        products
    );
}

#[tokio::test]
async fn broken_cache_degrades_to_store_reads() {
    let h = harness();
    let created = h.service.create(ProductDraft::new("A", 1.0)).await.unwrap();
    h.cache.set_mode(CacheMode::Broken);

    assert_eq!(h.service.list_all().await.unwrap(), vec![created.clone()]);
    assert_eq!(h.service.get_by_id(&created.id).await.unwrap(), created);
}

#[tokio::test]
async fn hanging_cache_is_bounded_by_timeout() {
    let h = harness();
    let created = h.service.create(ProductDraft::new("A", 1.0)).await.unwrap();
    h.cache.set_mode(CacheMode::Hanging);

    let result = tokio::time::timeout(Duration::from_secs(2), async {
        h.service.list_all().await.unwrap();
        h.service.get_by_id(&created.id).await.unwrap();
        h.service
            .update(&created.id, ProductPatch::price(2.0))
            .await
            .unwrap()
    })
    .await
    .expect("cache timeouts should keep requests bounded");
    assert_eq!(result.price, Some(2.0));
}

#[tokio::test]
async fn store_failure_on_read_is_unavailable() {
    let h = harness();
    h.store.fail(true);
    assert!(matches!(
        h.service.list_all().await,
        Err(CatalogError::StoreUnavailable(_))
    ));
    assert!(matches!(
        h.service.get_by_id("x").await,
        Err(CatalogError::StoreUnavailable(_))
    ));
    assert!(matches!(
        h.service.delete("x").await,
        Err(CatalogError::StoreUnavailable(_))
    ));
}

// ---- writes ----

#[tokio::test]
async fn create_invalidates_the_collection() {
    let h = harness();
    h.service.create(ProductDraft::new("A", 1.0)).await.unwrap();
    assert_eq!(h.service.list_all().await.unwrap().len(), 1);

    h.service.create(ProductDraft::new("B", 2.0)).await.unwrap();
    assert_eq!(h.cache.raw("all_products").await, None);

    let names: Vec<_> = h
        .service
        .list_all()
        .await
        .unwrap()
        .into_iter()
        .filter_map(|p| p.name)
        .collect();
    assert_eq!(names, vec!["A".to_string(), "B".to_string()]);
}

#[tokio::test]
async fn create_accepts_an_empty_draft() {
    let h = harness();
    let created = h.service.create(ProductDraft::default()).await.unwrap();
    assert!(!created.id.is_empty());
    assert_eq!(created.name, None);
    assert_eq!(created.price, None);
}

#[tokio::test]
async fn store_failure_on_write_is_write_failed() {
    let h = harness();
    h.store.fail(true);
    let err = h
        .service
        .create(ProductDraft::new("A", 1.0))
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::StoreWriteFailed(_)));
    assert_eq!(h.cache.deletes.load(Ordering::SeqCst), 0);

    let publisher = h.flush_events().await;
    assert!(publisher.events().is_empty());
}

#[tokio::test]
async fn update_merges_and_refreshes_entity() {
    let h = harness();
    let created = h
        .service
        .create(ProductDraft::new("Widget", 9.99))
        .await
        .unwrap();
    h.service.list_all().await.unwrap();

    let updated = h
        .service
        .update(&created.id, ProductPatch::name("").with_price(50.0))
        .await
        .unwrap();
    assert_eq!(updated.name.as_deref(), Some("Widget"));
    assert_eq!(updated.price, Some(50.0));

    assert_eq!(h.cache.raw("all_products").await, None);
    let raw = h.cache.raw(&format!("product_{}", created.id)).await.unwrap();
    assert_eq!(serde_json::from_slice::<Product>(&raw).unwrap(), updated);

    // served from the refreshed entry
    let reads = h.store.reads();
    assert_eq!(h.service.get_by_id(&created.id).await.unwrap(), updated);
    assert_eq!(h.store.reads(), reads);
}

#[tokio::test]
async fn update_missing_has_no_side_effects() {
    let h = harness();
    let err = h
        .service
        .update("ghost", ProductPatch::price(1.0))
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::NotFound { ref id } if id == "ghost"));
    assert_eq!(h.store.writes(), 0);
    assert_eq!(h.cache.deletes.load(Ordering::SeqCst), 0);
    assert_eq!(h.cache.sets.load(Ordering::SeqCst), 0);

    let publisher = h.flush_events().await;
    assert!(publisher.events().is_empty());
}

#[tokio::test]
async fn failed_refresh_falls_back_to_invalidation() {
    let h = harness();
    let created = h.service.create(ProductDraft::new("A", 1.0)).await.unwrap();
    h.service.get_by_id(&created.id).await.unwrap();

    h.cache.set_mode(CacheMode::Broken);
    let deletes_before = h.cache.deletes.load(Ordering::SeqCst);
    h.service
        .update(&created.id, ProductPatch::price(3.0))
        .await
        .unwrap();
    // collection: 3 attempts, entity fallback: 3 attempts
    assert_eq!(h.cache.deletes.load(Ordering::SeqCst) - deletes_before, 6);
}

#[tokio::test]
async fn delete_invalidates_both_keys() {
    let h = harness();
    let created = h.service.create(ProductDraft::new("A", 1.0)).await.unwrap();
    h.service.list_all().await.unwrap();
    h.service.get_by_id(&created.id).await.unwrap();

    h.service.delete(&created.id).await.unwrap();
    assert_eq!(h.cache.raw("all_products").await, None);
    assert_eq!(h.cache.raw(&format!("product_{}", created.id)).await, None);
    assert!(h.service.list_all().await.unwrap().is_empty());

    assert!(matches!(
        h.service.delete(&created.id).await,
        Err(CatalogError::NotFound { .. })
    ));
}

#[tokio::test]
async fn losing_a_delete_race_is_not_found() {
    let h = harness();
    let created = h.service.create(ProductDraft::new("A", 1.0)).await.unwrap();
    h.store.lose_delete_race.store(true, Ordering::SeqCst);

    let err = h.service.delete(&created.id).await.unwrap_err();
    assert!(matches!(err, CatalogError::NotFound { .. }));

    // only the create's event
    let publisher = h.flush_events().await;
    assert_eq!(publisher.events().len(), 1);
}

#[tokio::test]
async fn invalidation_is_retried_then_given_up() {
    let h = harness();
    h.cache.set_mode(CacheMode::Broken);

    let created = h.service.create(ProductDraft::new("A", 1.0)).await;
    tokio_test::assert_ok!(&created);
    assert_eq!(h.cache.deletes.load(Ordering::SeqCst), 3);
}

// ---- events ----

#[tokio::test]
async fn mutations_emit_events_in_order() {
    let h = harness();
    let created = h
        .service
        .create(ProductDraft::new("Widget", 9.99))
        .await
        .unwrap();
    let updated = h
        .service
        .update(&created.id, ProductPatch::price(12.5))
        .await
        .unwrap();
    h.service.delete(&created.id).await.unwrap();

    let publisher = h.flush_events().await;
    assert_eq!(
        publisher.events(),
        vec![
            ChangeEvent::added(created.clone()),
            ChangeEvent::updated(updated),
            ChangeEvent::deleted(created.id),
        ]
    );
}

#[tokio::test]
async fn broker_failure_never_fails_a_mutation() {
    let h = harness();
    h.publisher.failing.store(true, Ordering::SeqCst);

    let created = h.service.create(ProductDraft::new("A", 1.0)).await.unwrap();
    h.service
        .update(&created.id, ProductPatch::name("B"))
        .await
        .unwrap();
    h.service.delete(&created.id).await.unwrap();

    let publisher = h.flush_events().await;
    assert!(publisher.events().is_empty());
}
