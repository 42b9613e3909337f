//! User repository for database operations.

use async_trait::async_trait;
use parlor_hub::{IdentityStore, StoreResult, User, UserId};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::error::store_error;
use crate::timestamps::{format_timestamp, now};

/// Repository for user database operations
#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Every registered user, ordered by username.
    pub async fn list_users(&self) -> StoreResult<Vec<User>> {
        let rows = sqlx::query("SELECT id, username FROM users ORDER BY username")
            .fetch_all(&self.pool)
            .await
            .map_err(store_error("user"))?;

        Ok(rows.iter().map(user_from_row).collect())
    }
}

fn user_from_row(row: &SqliteRow) -> User {
    User {
        id: UserId(row.get("id")),
        username: row.get("username"),
    }
}

#[async_trait]
impl IdentityStore for UserRepository {
    async fn create_user(&self, username: &str, password_hash: &str) -> StoreResult<User> {
        let result = sqlx::query(
            "INSERT INTO users (username, password_hash, created_at) VALUES (?, ?, ?)",
        )
        .bind(username)
        .bind(password_hash)
        .bind(format_timestamp(now()))
        .execute(&self.pool)
        .await
        .map_err(store_error("user"))?;

        Ok(User {
            id: UserId(result.last_insert_rowid()),
            username: username.to_string(),
        })
    }

    async fn find_user_by_id(&self, id: UserId) -> StoreResult<User> {
        let row = sqlx::query("SELECT id, username FROM users WHERE id = ?")
            .bind(id.0)
            .fetch_one(&self.pool)
            .await
            .map_err(store_error("user"))?;

        Ok(user_from_row(&row))
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<User> {
        let row = sqlx::query("SELECT id, username FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(store_error("user"))?;

        Ok(user_from_row(&row))
    }

    async fn password_hash(&self, id: UserId) -> StoreResult<String> {
        let row = sqlx::query("SELECT password_hash FROM users WHERE id = ?")
            .bind(id.0)
            .fetch_one(&self.pool)
            .await
            .map_err(store_error("user"))?;

        Ok(row.get("password_hash"))
    }
}
