use catalog_storage::StorageError;
use sqlx_core::error::Error as SqlxError;

/// Failures while opening or preparing the database.
///
/// Query-time failures are mapped straight to [`StorageError`] by
/// [`map_sqlx_error`]; this type only covers pool setup and migrations.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    #[error("database error: {0}")]
    Sqlx(#[from] SqlxError),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx_core::migrate::MigrateError),

    #[error("invalid postgres config: {message}")]
    Config { message: String },
}

impl PostgresError {
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<PostgresError> for StorageError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::Sqlx(e) => map_sqlx_error(e),
            other => StorageError::internal(other.to_string()),
        }
    }
}

/// Unreachable-database errors become connection errors, the rest internal.
pub(crate) fn map_sqlx_error(err: SqlxError) -> StorageError {
    match err {
        SqlxError::Io(_)
        | SqlxError::Tls(_)
        | SqlxError::PoolTimedOut
        | SqlxError::PoolClosed
        | SqlxError::WorkerCrashed => StorageError::connection_error(err.to_string()),
        other => StorageError::internal(other.to_string()),
    }
}

pub type Result<T> = std::result::Result<T, PostgresError>;
