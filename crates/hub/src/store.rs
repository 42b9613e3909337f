//! Collaborator contracts.
//!
//! The hub never talks to a database directly. It is handed implementations of
//! these traits; `parlor-database` provides the SQLite ones. Implementations
//! must tolerate concurrent calls from many room actors.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Message, Room, RoomId, Session, User, UserId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} already exists")]
    Conflict(&'static str),

    #[error("session expired")]
    Expired,

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn create_user(&self, username: &str, password_hash: &str) -> StoreResult<User>;
    async fn find_user_by_id(&self, id: UserId) -> StoreResult<User>;
    async fn find_user_by_username(&self, username: &str) -> StoreResult<User>;
    /// Stored credential hash for `id`. Only the auth boundary calls this.
    async fn password_hash(&self, id: UserId) -> StoreResult<String>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, user_id: UserId, ttl: Duration) -> StoreResult<Session>;
    /// Resolves a live session. Expired sessions are removed and reported as [`StoreError::Expired`].
    async fn get_session(&self, session_id: &str) -> StoreResult<Session>;
    async fn delete_session(&self, session_id: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn create_room(&self, name: &str) -> StoreResult<Room>;
    async fn find_room(&self, id: RoomId) -> StoreResult<Room>;
    async fn list_rooms(&self) -> StoreResult<Vec<Room>>;
    async fn delete_room(&self, id: RoomId) -> StoreResult<()>;
}

#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Joining twice is not an error.
    async fn join_room(&self, user_id: UserId, room_id: RoomId) -> StoreResult<()>;
    /// Leaving a room the user is not in is not an error.
    async fn leave_room(&self, user_id: UserId, room_id: RoomId) -> StoreResult<()>;
    async fn list_members(&self, room_id: RoomId) -> StoreResult<Vec<UserId>>;
    async fn list_rooms_for_user(&self, user_id: UserId) -> StoreResult<Vec<RoomId>>;
    async fn is_member(&self, user_id: UserId, room_id: RoomId) -> StoreResult<bool> {
        Ok(self.list_members(room_id).await?.contains(&user_id))
    }
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn save_message(&self, user_id: UserId, room_id: RoomId, body: &str)
        -> StoreResult<Message>;
    /// The most recent `limit` messages of a room, oldest first.
    async fn list_messages(&self, room_id: RoomId, limit: u32) -> StoreResult<Vec<Message>>;
}

/// The persistence collaborators the hub itself needs.
#[derive(Clone)]
pub struct ChatStores {
    pub rooms: Arc<dyn RoomStore>,
    pub memberships: Arc<dyn MembershipStore>,
    pub messages: Arc<dyn MessageStore>,
}
