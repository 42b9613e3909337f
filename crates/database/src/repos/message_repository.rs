//! Message repository for database operations.

use async_trait::async_trait;
use parlor_hub::{Message, MessageId, MessageStore, RoomId, StoreResult, UserId};
use sqlx::{Row, SqlitePool};

use crate::error::store_error;
use crate::timestamps::{format_timestamp, now, parse_timestamp};

/// Repository for message database operations
#[derive(Clone)]
pub struct MessageRepository {
    pool: SqlitePool,
}

impl MessageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for MessageRepository {
    async fn save_message(
        &self,
        user_id: UserId,
        room_id: RoomId,
        body: &str,
    ) -> StoreResult<Message> {
        let timestamp = now();
        let result = sqlx::query(
            "INSERT INTO messages (room_id, user_id, body, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(room_id.0)
        .bind(user_id.0)
        .bind(body)
        .bind(format_timestamp(timestamp))
        .execute(&self.pool)
        .await
        .map_err(store_error("message"))?;

        Ok(Message {
            id: MessageId(result.last_insert_rowid()),
            room_id,
            user_id,
            body: body.to_string(),
            timestamp,
        })
    }

    async fn list_messages(&self, room_id: RoomId, limit: u32) -> StoreResult<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT id, room_id, user_id, body, created_at FROM (
                SELECT id, room_id, user_id, body, created_at FROM messages
                WHERE room_id = ? ORDER BY id DESC LIMIT ?
            ) ORDER BY id ASC",
        )
        .bind(room_id.0)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error("message"))?;

        rows.iter()
            .map(|row| {
                Ok(Message {
                    id: MessageId(row.get("id")),
                    room_id: RoomId(row.get("room_id")),
                    user_id: UserId(row.get("user_id")),
                    body: row.get("body"),
                    timestamp: parse_timestamp(&row.get::<String, _>("created_at"))?,
                })
            })
            .collect()
    }
}
