//! Error types for the database layer

use parlor_hub::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    #[error("Database migration error: {0}")]
    MigrationError(String),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Translate a driver error, naming `entity` when a lookup came back empty
/// or a uniqueness constraint fired.
pub(crate) fn store_error(entity: &'static str) -> impl Fn(sqlx::Error) -> StoreError {
    move |error| match &error {
        sqlx::Error::RowNotFound => StoreError::NotFound(entity),
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(entity),
        _ => StoreError::Backend(error.to_string()),
    }
}
