//! HTTP server for the product catalog.
//!
//! Products live in a record store (PostgreSQL or in-memory), reads are
//! served cache-aside from a key/value cache (local or Redis), and every
//! committed mutation is announced on a change-event topic.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod observability;
pub mod server;

pub use cache::{CacheBackend, CacheError, CacheLayer, CachePolicy, create_cache_backend};
pub use catalog::{CatalogError, CatalogService, CatalogSettings};
pub use config::{AppConfig, RedisConfig};
pub use error::ApiError;
pub use events::{EventDispatcher, EventPublisher, NoopEventPublisher, PublishError};
pub use observability::{init_tracing, shutdown_tracing};
pub use server::{AppState, ServerBuilder, build_app, router};
