use async_trait::async_trait;
use catalog_core::{Product, ProductDraft, generate_id};
use catalog_storage::{ProductStore, StorageError};
use sqlx_postgres::PgPool;
use tracing::{debug, info, instrument};

use crate::config::PostgresConfig;
use crate::pool::create_pool;
use crate::{migrations, queries};

/// Product store backed by a PostgreSQL JSONB table.
#[derive(Debug, Clone)]
pub struct PostgresProductStore {
    pool: PgPool,
}

impl PostgresProductStore {
    /// Connects to the database and, if configured, applies migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be created or a migration fails.
    pub async fn new(config: PostgresConfig) -> Result<Self, StorageError> {
        let pool = create_pool(&config).await?;

        if config.migrate {
            migrations::run(&pool).await?;
        }

        info!("PostgreSQL product store ready");
        Ok(Self { pool })
    }

    /// Wraps an existing pool. Migrations are not run.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ProductStore for PostgresProductStore {
    #[instrument(skip(self, draft))]
    async fn insert(&self, draft: &ProductDraft) -> Result<Product, StorageError> {
        let product = Product::from_draft(generate_id(), draft.clone());
        queries::insert(&self.pool, &product).await?;
        debug!(id = %product.id, "Inserted product");
        Ok(product)
    }

    async fn find_all(&self) -> Result<Vec<Product>, StorageError> {
        queries::select_all(&self.pool).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Product>, StorageError> {
        queries::select_one(&self.pool, id).await
    }

    #[instrument(skip(self, product), fields(id = %product.id))]
    async fn save(&self, product: &Product) -> Result<Product, StorageError> {
        if queries::update(&self.pool, product).await? {
            Ok(product.clone())
        } else {
            Err(StorageError::not_found(&product.id))
        }
    }

    #[instrument(skip(self))]
    async fn delete_by_id(&self, id: &str) -> Result<bool, StorageError> {
        queries::delete(&self.pool, id).await
    }

    async fn ping(&self) -> Result<(), StorageError> {
        queries::ping(&self.pool).await
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
