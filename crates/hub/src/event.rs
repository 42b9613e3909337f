//! The closed set of events exchanged between actors.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::connection::ConnectionHandle;
use crate::room::RoomHandle;
use crate::types::{ConnectionId, MessageId, RoomId, UserId};

/// A chat line on its way through the system.
///
/// Before the room persists it, `id` is `None` and `timestamp` is the receive
/// time; the copy fanned out to members carries the stored values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: Option<MessageId>,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub username: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

/// Everything one actor can tell another.
///
/// Each actor matches on this exhaustively; a variant an actor has no use for
/// is logged and dropped.
#[derive(Debug, Clone)]
pub enum Event {
    Message(Arc<ChatMessage>),
    UserJoinRoom { user_id: UserId, room_id: RoomId },
    UserLeaveRoom { user_id: UserId, room_id: RoomId },
    UserConnect(ConnectionHandle),
    UserDisconnect { user_id: UserId, connection_id: ConnectionId },
    RoomCreate(RoomHandle),
    RoomDestroy { room_id: RoomId },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::UserJoinRoom { .. } => "user_join_room",
            Self::UserLeaveRoom { .. } => "user_leave_room",
            Self::UserConnect(_) => "user_connect",
            Self::UserDisconnect { .. } => "user_disconnect",
            Self::RoomCreate(_) => "room_create",
            Self::RoomDestroy { .. } => "room_destroy",
        }
    }
}
