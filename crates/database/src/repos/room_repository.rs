//! Room repository for database operations.

use async_trait::async_trait;
use parlor_hub::{Room, RoomId, RoomStore, StoreError, StoreResult};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::error::store_error;
use crate::timestamps::{format_timestamp, now};

/// Repository for room database operations
#[derive(Clone)]
pub struct RoomRepository {
    pool: SqlitePool,
}

impl RoomRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn room_from_row(row: &SqliteRow) -> Room {
    Room {
        id: RoomId(row.get("id")),
        name: row.get("name"),
    }
}

#[async_trait]
impl RoomStore for RoomRepository {
    async fn create_room(&self, name: &str) -> StoreResult<Room> {
        let result = sqlx::query("INSERT INTO rooms (name, created_at) VALUES (?, ?)")
            .bind(name)
            .bind(format_timestamp(now()))
            .execute(&self.pool)
            .await
            .map_err(store_error("room"))?;

        Ok(Room {
            id: RoomId(result.last_insert_rowid()),
            name: name.to_string(),
        })
    }

    async fn find_room(&self, id: RoomId) -> StoreResult<Room> {
        let row = sqlx::query("SELECT id, name FROM rooms WHERE id = ?")
            .bind(id.0)
            .fetch_one(&self.pool)
            .await
            .map_err(store_error("room"))?;

        Ok(room_from_row(&row))
    }

    async fn list_rooms(&self) -> StoreResult<Vec<Room>> {
        let rows = sqlx::query("SELECT id, name FROM rooms ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(store_error("room"))?;

        Ok(rows.iter().map(room_from_row).collect())
    }

    /// Memberships and messages go with the room.
    async fn delete_room(&self, id: RoomId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM rooms WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(store_error("room"))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("room"));
        }
        Ok(())
    }
}
