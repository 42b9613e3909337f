use thiserror::Error;

use crate::store::StoreError;
use crate::types::RoomId;

/// Setup-time failures returned to callers of the [`Hub`](crate::Hub).
///
/// Faults inside running actors are logged where they happen and never
/// surface here.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("hub is not running")]
    Stopped,

    #[error("room {0} is not live")]
    RoomNotFound(RoomId),

    #[error("invalid chat settings: {0}")]
    InvalidSettings(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type HubResult<T> = Result<T, HubError>;
