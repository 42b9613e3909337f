//! Room membership repository.

use async_trait::async_trait;
use parlor_hub::{MembershipStore, RoomId, StoreResult, UserId};
use sqlx::{Row, SqlitePool};

use crate::error::store_error;
use crate::timestamps::{format_timestamp, now};

/// Repository for the `room_users` join table
#[derive(Clone)]
pub struct MembershipRepository {
    pool: SqlitePool,
}

impl MembershipRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipStore for MembershipRepository {
    async fn join_room(&self, user_id: UserId, room_id: RoomId) -> StoreResult<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO room_users (room_id, user_id, joined_at) VALUES (?, ?, ?)",
        )
        .bind(room_id.0)
        .bind(user_id.0)
        .bind(format_timestamp(now()))
        .execute(&self.pool)
        .await
        .map_err(store_error("membership"))?;
        Ok(())
    }

    async fn leave_room(&self, user_id: UserId, room_id: RoomId) -> StoreResult<()> {
        sqlx::query("DELETE FROM room_users WHERE room_id = ? AND user_id = ?")
            .bind(room_id.0)
            .bind(user_id.0)
            .execute(&self.pool)
            .await
            .map_err(store_error("membership"))?;
        Ok(())
    }

    async fn list_members(&self, room_id: RoomId) -> StoreResult<Vec<UserId>> {
        let rows = sqlx::query("SELECT user_id FROM room_users WHERE room_id = ? ORDER BY user_id")
            .bind(room_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error("membership"))?;

        Ok(rows.iter().map(|row| UserId(row.get("user_id"))).collect())
    }

    async fn list_rooms_for_user(&self, user_id: UserId) -> StoreResult<Vec<RoomId>> {
        let rows = sqlx::query("SELECT room_id FROM room_users WHERE user_id = ? ORDER BY room_id")
            .bind(user_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error("membership"))?;

        Ok(rows.iter().map(|row| RoomId(row.get("room_id"))).collect())
    }

    async fn is_member(&self, user_id: UserId, room_id: RoomId) -> StoreResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM room_users WHERE room_id = ? AND user_id = ?) AS present",
        )
        .bind(room_id.0)
        .bind(user_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error("membership"))?;

        Ok(row.get("present"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_room, seed_user, test_pool};
    use parlor_hub::StoreError;

    #[tokio::test]
    async fn join_is_idempotent() {
        let (pool, _temp_dir) = test_pool().await;
        let alice = seed_user(&pool, "alice").await;
        let room = seed_room(&pool, "general").await;
        let repo = MembershipRepository::new(pool);

        repo.join_room(alice.id, room.id).await.unwrap();
        repo.join_room(alice.id, room.id).await.unwrap();

        assert_eq!(repo.list_members(room.id).await.unwrap(), vec![alice.id]);
        assert_eq!(repo.list_rooms_for_user(alice.id).await.unwrap(), vec![room.id]);
        assert!(repo.is_member(alice.id, room.id).await.unwrap());
    }

    #[tokio::test]
    async fn leave_is_idempotent() {
        let (pool, _temp_dir) = test_pool().await;
        let alice = seed_user(&pool, "alice").await;
        let room = seed_room(&pool, "general").await;
        let repo = MembershipRepository::new(pool);

        repo.leave_room(alice.id, room.id).await.unwrap();
        repo.join_room(alice.id, room.id).await.unwrap();
        repo.leave_room(alice.id, room.id).await.unwrap();

        assert!(repo.list_members(room.id).await.unwrap().is_empty());
        assert!(!repo.is_member(alice.id, room.id).await.unwrap());
    }

    #[tokio::test]
    async fn joining_a_missing_room_fails() {
        let (pool, _temp_dir) = test_pool().await;
        let alice = seed_user(&pool, "alice").await;
        let repo = MembershipRepository::new(pool);

        let err = repo.join_room(alice.id, RoomId(77)).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }
}
