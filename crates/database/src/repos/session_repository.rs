//! Session repository for database operations.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parlor_hub::{Session, SessionStore, StoreError, StoreResult, UserId};
use rand::RngCore;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::store_error;
use crate::timestamps::{format_timestamp, now, parse_timestamp};

const TOKEN_BYTES: usize = 32;

/// Repository for session database operations
#[derive(Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Remove every expired session, returning how many were deleted.
    pub async fn delete_expired(&self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(format_timestamp(now()))
            .execute(&self.pool)
            .await
            .map_err(store_error("session"))?;

        Ok(result.rows_affected())
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[async_trait]
impl SessionStore for SessionRepository {
    async fn create_session(&self, user_id: UserId, ttl: Duration) -> StoreResult<Session> {
        let created_at = now();
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StoreError::Backend(format!("invalid session ttl: {e}")))?;
        let expires_at = created_at
            .checked_add_signed(ttl)
            .ok_or_else(|| StoreError::Backend("session ttl out of range".into()))?;
        let session = Session {
            id: generate_token(),
            user_id,
            expires_at,
        };

        sqlx::query(
            "INSERT INTO sessions (id, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(user_id.0)
        .bind(format_timestamp(created_at))
        .bind(format_timestamp(session.expires_at))
        .execute(&self.pool)
        .await
        .map_err(store_error("session"))?;

        Ok(session)
    }

    async fn get_session(&self, session_id: &str) -> StoreResult<Session> {
        let row = sqlx::query("SELECT id, user_id, expires_at FROM sessions WHERE id = ?")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
            .map_err(store_error("session"))?;

        let session = Session {
            id: row.get("id"),
            user_id: UserId(row.get("user_id")),
            expires_at: parse_timestamp(&row.get::<String, _>("expires_at"))?,
        };

        if session.expires_at <= now() {
            debug!(user_id = %session.user_id, "removing expired session");
            self.delete_session(session_id).await?;
            return Err(StoreError::Expired);
        }

        Ok(session)
    }

    async fn delete_session(&self, session_id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(store_error("session"))?;
        Ok(())
    }
}
