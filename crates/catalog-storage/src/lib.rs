//! # catalog-storage
//!
//! Record store abstraction for the catalog service.
//!
//! This crate defines the [`ProductStore`] trait and the [`StorageError`]
//! type. It contains no implementations; backends live in
//! `catalog-db-memory` and `catalog-db-postgres`.
//!
//! ## Example
//!
//! ```ignore
//! use catalog_storage::{ProductStore, StorageError};
//!
//! async fn price_of(store: &dyn ProductStore, id: &str) -> Result<Option<f64>, StorageError> {
//!     Ok(store.find_by_id(id).await?.and_then(|p| p.price))
//! }
//! ```

mod error;
mod traits;

pub use error::StorageError;
pub use traits::ProductStore;

/// Type alias for a shared store trait object.
pub type DynProductStore = std::sync::Arc<dyn ProductStore>;
