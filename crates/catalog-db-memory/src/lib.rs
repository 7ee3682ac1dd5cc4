//! In-memory record store backend for the catalog service.
//!
//! This crate provides an implementation of the `ProductStore` trait from
//! `catalog-storage`, using a papaya lock-free HashMap for concurrent access.
//!
//! # Example
//!
//! ```ignore
//! use catalog_core::ProductDraft;
//! use catalog_db_memory::InMemoryProductStore;
//! use catalog_storage::ProductStore;
//!
//! let store = InMemoryProductStore::new();
//! let created = store.insert(&ProductDraft::new("Widget", 9.99)).await?;
//! ```

mod storage;

pub use catalog_storage::{ProductStore, StorageError};
pub use storage::InMemoryProductStore;

/// Creates a new shared in-memory store.
pub fn create_product_store() -> catalog_storage::DynProductStore {
    std::sync::Arc::new(InMemoryProductStore::new())
}
