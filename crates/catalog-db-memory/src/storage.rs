use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use catalog_core::{Product, ProductDraft, generate_id};
use catalog_storage::{ProductStore, StorageError};
use papaya::HashMap as PapayaHashMap;

/// Stored document plus its insertion sequence, used to keep `find_all` ordered.
#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    product: Product,
}

/// In-memory product store using papaya lock-free HashMap.
///
/// Cloning is cheap and every clone shares the same data.
#[derive(Debug, Clone)]
pub struct InMemoryProductStore {
    data: Arc<PapayaHashMap<String, Entry>>,
    seq: Arc<AtomicU64>,
}

impl InMemoryProductStore {
    pub fn new() -> Self {
        Self {
            data: Arc::new(PapayaHashMap::new()),
            seq: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Number of stored products.
    pub fn len(&self) -> usize {
        self.data.pin().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryProductStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn insert(&self, draft: &ProductDraft) -> Result<Product, StorageError> {
        let product = Product::from_draft(generate_id(), draft.clone());
        let entry = Entry {
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            product: product.clone(),
        };
        self.data.pin().insert(product.id.clone(), entry);
        Ok(product)
    }

    async fn find_all(&self) -> Result<Vec<Product>, StorageError> {
        let guard = self.data.pin();
        let mut entries: Vec<Entry> = guard.iter().map(|(_, entry)| entry.clone()).collect();
        entries.sort_by_key(|entry| entry.seq);
        Ok(entries.into_iter().map(|entry| entry.product).collect())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Product>, StorageError> {
        Ok(self.data.pin().get(id).map(|entry| entry.product.clone()))
    }

    async fn save(&self, product: &Product) -> Result<Product, StorageError> {
        let guard = self.data.pin();
        // `update` only replaces an existing entry, so a concurrent delete wins.
        guard
            .update(product.id.clone(), |entry| Entry {
                seq: entry.seq,
                product: product.clone(),
            })
            .map(|entry| entry.product.clone())
            .ok_or_else(|| StorageError::not_found(&product.id))
    }

    async fn delete_by_id(&self, id: &str) -> Result<bool, StorageError> {
        Ok(self.data.pin().remove(id).is_some())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
