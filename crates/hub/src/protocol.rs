//! JSON frames spoken with the remote peer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::ChatMessage;
use crate::types::{MessageId, RoomId, UserId};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed chat frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("chat frame has an empty body")]
    EmptyBody,
}

/// A chat frame as sent by a client.
///
/// `userId` is accepted for compatibility and ignored: the connection stamps
/// the authenticated identity on everything it forwards.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundChat {
    pub room_id: RoomId,
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub body: String,
}

impl InboundChat {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let frame: Self = serde_json::from_str(text)?;
        if frame.body.trim().is_empty() {
            return Err(ProtocolError::EmptyBody);
        }
        Ok(frame)
    }
}

/// A chat frame as delivered to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundChat {
    pub id: Option<MessageId>,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub username: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&ChatMessage> for OutboundChat {
    fn from(message: &ChatMessage) -> Self {
        Self {
            id: message.id,
            room_id: message.room_id,
            user_id: message.user_id,
            username: message.username.clone(),
            body: message.body.clone(),
            timestamp: message.timestamp,
        }
    }
}
