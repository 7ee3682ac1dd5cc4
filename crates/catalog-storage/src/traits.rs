//! The record store contract.

use async_trait::async_trait;
use catalog_core::{Product, ProductDraft};

use crate::error::StorageError;

/// The system of record for products.
///
/// Implementations must be thread-safe (`Send + Sync`); a single instance is
/// shared across all concurrent requests.
///
/// # Example
///
/// ```ignore
/// use catalog_storage::{ProductStore, StorageError};
///
/// async fn rename(store: &dyn ProductStore, id: &str) -> Result<(), StorageError> {
///     if let Some(mut product) = store.find_by_id(id).await? {
///         product.name = Some("Renamed".into());
///         store.save(&product).await?;
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Persists a new product and returns it with its assigned id.
    async fn insert(&self, draft: &ProductDraft) -> Result<Product, StorageError>;

    /// Returns every product in insertion order.
    async fn find_all(&self) -> Result<Vec<Product>, StorageError>;

    /// Reads a product by id.
    ///
    /// Returns `None` if the product does not exist. Errors are reserved for
    /// infrastructure issues.
    async fn find_by_id(&self, id: &str) -> Result<Option<Product>, StorageError>;

    /// Overwrites an existing product.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the product no longer exists.
    async fn save(&self, product: &Product) -> Result<Product, StorageError>;

    /// Deletes a product by id.
    ///
    /// Returns `false` if there was nothing to delete.
    async fn delete_by_id(&self, id: &str) -> Result<bool, StorageError>;

    /// Cheap connectivity probe used by readiness checks.
    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }

    /// Returns the name of this storage backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}
