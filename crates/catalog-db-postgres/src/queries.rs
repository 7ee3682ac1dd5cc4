//! SQL for the `products` table.
//!
//! The `document` column holds every product field except `id`, which lives
//! in its own primary key column.

use catalog_core::{Product, ProductDraft};
use catalog_storage::StorageError;
use serde_json::Value;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::PgPool;

use crate::error::map_sqlx_error;

const INSERT_SQL: &str = "INSERT INTO products (id, document) VALUES ($1, $2)";

const SELECT_ALL_SQL: &str = "SELECT id, document FROM products ORDER BY seq";

const SELECT_ONE_SQL: &str = "SELECT id, document FROM products WHERE id = $1";

const UPDATE_SQL: &str = r#"UPDATE products
   SET document = $2, updated_at = now()
   WHERE id = $1"#;

const DELETE_SQL: &str = "DELETE FROM products WHERE id = $1";

/// Converts the stored fields of a product into its JSONB document.
pub(crate) fn to_document(product: &Product) -> Result<Value, StorageError> {
    let draft = ProductDraft {
        name: product.name.clone(),
        price: product.price,
    };
    serde_json::to_value(draft).map_err(|e| StorageError::invalid_document(e.to_string()))
}

/// Rebuilds a product from its id column and JSONB document.
pub(crate) fn from_row(id: String, document: Value) -> Result<Product, StorageError> {
    let draft: ProductDraft = serde_json::from_value(document)
        .map_err(|e| StorageError::invalid_document(format!("product {id}: {e}")))?;
    Ok(Product::from_draft(id, draft))
}

pub async fn insert(pool: &PgPool, product: &Product) -> Result<(), StorageError> {
    let document = to_document(product)?;
    query(INSERT_SQL)
        .bind(&product.id)
        .bind(&document)
        .execute(pool)
        .await
        .map_err(map_sqlx_error)?;
    Ok(())
}

pub async fn select_all(pool: &PgPool) -> Result<Vec<Product>, StorageError> {
    let rows: Vec<(String, Value)> = query_as(SELECT_ALL_SQL)
        .fetch_all(pool)
        .await
        .map_err(map_sqlx_error)?;

    rows.into_iter()
        .map(|(id, document)| from_row(id, document))
        .collect()
}

pub async fn select_one(pool: &PgPool, id: &str) -> Result<Option<Product>, StorageError> {
    let row: Option<(String, Value)> = query_as(SELECT_ONE_SQL)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(map_sqlx_error)?;

    row.map(|(id, document)| from_row(id, document)).transpose()
}

/// Returns `false` when no row matched.
pub async fn update(pool: &PgPool, product: &Product) -> Result<bool, StorageError> {
    let document = to_document(product)?;
    let result = query(UPDATE_SQL)
        .bind(&product.id)
        .bind(&document)
        .execute(pool)
        .await
        .map_err(map_sqlx_error)?;
    Ok(result.rows_affected() > 0)
}

/// Returns `false` when no row matched.
pub async fn delete(pool: &PgPool, id: &str) -> Result<bool, StorageError> {
    let result = query(DELETE_SQL)
        .bind(id)
        .execute(pool)
        .await
        .map_err(map_sqlx_error)?;
    Ok(result.rows_affected() > 0)
}

pub async fn ping(pool: &PgPool) -> Result<(), StorageError> {
    let _: i32 = query_scalar("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(map_sqlx_error)?;
    Ok(())
}
