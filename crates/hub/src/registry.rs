//! Snapshots of the hub's live actors.

use std::collections::HashMap;

use crate::connection::ConnectionHandle;
use crate::room::RoomHandle;
use crate::types::{RoomId, UserId};

/// Who is live right now.
///
/// Only the hub worker builds these. Everyone else receives an immutable copy
/// through a `watch` channel and uses it to find the mailbox of a peer actor.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    pub(crate) connections: HashMap<UserId, ConnectionHandle>,
    pub(crate) rooms: HashMap<RoomId, RoomHandle>,
}

impl Registry {
    pub fn connection(&self, user_id: UserId) -> Option<&ConnectionHandle> {
        self.connections.get(&user_id)
    }

    pub fn room(&self, room_id: RoomId) -> Option<&RoomHandle> {
        self.rooms.get(&room_id)
    }

    pub fn is_connected(&self, user_id: UserId) -> bool {
        self.connections.contains_key(&user_id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn connected_users(&self) -> Vec<UserId> {
        let mut users: Vec<_> = self.connections.keys().copied().collect();
        users.sort_unstable();
        users
    }

    pub fn room_ids(&self) -> Vec<RoomId> {
        let mut rooms: Vec<_> = self.rooms.keys().copied().collect();
        rooms.sort_unstable();
        rooms
    }
}
