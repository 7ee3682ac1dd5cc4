//! Cache keys and TTL.

use std::time::Duration;

/// Which kind of entry a key addresses. Used as a metrics label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKeyKind {
    Collection,
    Entity,
}

impl CacheKeyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKeyKind::Collection => "collection",
            CacheKeyKind::Entity => "entity",
        }
    }
}

/// Key naming and the single TTL applied to every entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    ttl: Duration,
}

impl CachePolicy {
    /// Key of the full product list.
    pub const COLLECTION_KEY: &'static str = "all_products";

    const ENTITY_PREFIX: &'static str = "product_";

    pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Key of a single product.
    pub fn entity_key(id: &str) -> String {
        format!("{}{}", Self::ENTITY_PREFIX, id)
    }

    pub fn kind_of(key: &str) -> CacheKeyKind {
        if key == Self::COLLECTION_KEY {
            CacheKeyKind::Collection
        } else {
            CacheKeyKind::Entity
        }
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL)
    }
}
