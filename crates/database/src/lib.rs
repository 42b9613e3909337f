//! Parlor Database Crate
//!
//! SQLite persistence for the chat hub: connection management, embedded
//! migrations, and repositories implementing the hub's collaborator traits.

use parlor_config::DatabaseConfig;
use sqlx::SqlitePool;

pub mod connection;
pub mod error;
pub mod migrations;
pub mod repos;
mod timestamps;

pub use connection::prepare_database;
pub use error::{DatabaseError, DatabaseResult};
pub use migrations::{run_migrations, MIGRATOR};
pub use repos::{
    MembershipRepository, MessageRepository, RoomRepository, SessionRepository, UserRepository,
};

/// Open the database and bring its schema up to date.
pub async fn initialize_database(config: &DatabaseConfig) -> DatabaseResult<SqlitePool> {
    let pool = prepare_database(config)
        .await
        .map_err(|e| DatabaseError::ConnectionError(format!("{e:#}")))?;

    run_migrations(&pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("{e:#}")))?;

    Ok(pool)
}
