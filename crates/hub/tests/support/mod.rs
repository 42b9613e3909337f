#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parlor_config::{ChatConfig, MailboxKind};
use parlor_hub::transport::memory::MemoryPeer;
use parlor_hub::{
    ChatStores, Frame, MembershipStore, Message, MessageId, MessageStore, OutboundChat, Room,
    RoomId, RoomStore, StoreError, StoreResult, User, UserId,
};

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

pub const PATIENCE: Duration = Duration::from_secs(5);

#[derive(Default)]
struct State {
    next_room: i64,
    next_message: i64,
    rooms: BTreeMap<RoomId, Room>,
    members: BTreeSet<(RoomId, UserId)>,
    messages: Vec<Message>,
}

/// In-memory collaborators with a switch for failing message saves.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn stores(self: &Arc<Self>) -> ChatStores {
        ChatStores {
            rooms: self.clone(),
            memberships: self.clone(),
            messages: self.clone(),
        }
    }

    pub fn add_room(&self, name: &str) -> Room {
        let mut state = self.state.lock().unwrap();
        state.next_room += 1;
        let room = Room {
            id: RoomId(state.next_room),
            name: name.to_string(),
        };
        state.rooms.insert(room.id, room.clone());
        room
    }

    pub fn add_member(&self, room_id: RoomId, user_id: UserId) {
        self.state.lock().unwrap().members.insert((room_id, user_id));
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state.lock().unwrap().messages.clone()
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn create_room(&self, name: &str) -> StoreResult<Room> {
        Ok(self.add_room(name))
    }

    async fn find_room(&self, id: RoomId) -> StoreResult<Room> {
        self.state
            .lock()
            .unwrap()
            .rooms
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("room"))
    }

    async fn list_rooms(&self) -> StoreResult<Vec<Room>> {
        Ok(self.state.lock().unwrap().rooms.values().cloned().collect())
    }

    async fn delete_room(&self, id: RoomId) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state.rooms.remove(&id);
        state.members.retain(|(room_id, _)| *room_id != id);
        Ok(())
    }
}

#[async_trait]
impl MembershipStore for MemoryStore {
    async fn join_room(&self, user_id: UserId, room_id: RoomId) -> StoreResult<()> {
        self.add_member(room_id, user_id);
        Ok(())
    }

    async fn leave_room(&self, user_id: UserId, room_id: RoomId) -> StoreResult<()> {
        self.state
            .lock()
            .unwrap()
            .members
            .remove(&(room_id, user_id));
        Ok(())
    }

    async fn list_members(&self, room_id: RoomId) -> StoreResult<Vec<UserId>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .members
            .iter()
            .filter(|(room, _)| *room == room_id)
            .map(|(_, user)| *user)
            .collect())
    }

    async fn list_rooms_for_user(&self, user_id: UserId) -> StoreResult<Vec<RoomId>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .members
            .iter()
            .filter(|(_, user)| *user == user_id)
            .map(|(room, _)| *room)
            .collect())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn save_message(
        &self,
        user_id: UserId,
        room_id: RoomId,
        body: &str,
    ) -> StoreResult<Message> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk on fire".into()));
        }
        let mut state = self.state.lock().unwrap();
        state.next_message += 1;
        let message = Message {
            id: MessageId(state.next_message),
            room_id,
            user_id,
            body: body.to_string(),
            timestamp: Utc::now(),
        };
        state.messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages(&self, room_id: RoomId, limit: u32) -> StoreResult<Vec<Message>> {
        let state = self.state.lock().unwrap();
        let mut messages: Vec<_> = state
            .messages
            .iter()
            .filter(|message| message.room_id == room_id)
            .cloned()
            .collect();
        let skip = messages.len().saturating_sub(limit as usize);
        Ok(messages.split_off(skip))
    }
}

pub fn user(id: i64, username: &str) -> User {
    User {
        id: UserId(id),
        username: username.to_string(),
    }
}

/// Keepalive far enough out that it never interferes.
pub fn chat_config() -> ChatConfig {
    ChatConfig {
        write_wait_ms: 1_000,
        pong_wait_ms: 5_000,
        ping_interval_ms: 4_000,
        max_message_size: 512,
        mailbox: MailboxKind::Bounded,
        mailbox_capacity: 16,
    }
}

pub fn chat_frame(room_id: RoomId, body: &str) -> String {
    serde_json::json!({ "roomId": room_id, "body": body }).to_string()
}

pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(PATIENCE, future)
        .await
        .expect("timed out waiting for the hub")
}

/// Next chat frame written to `peer`, skipping pings.
pub async fn next_chat(peer: &mut MemoryPeer) -> OutboundChat {
    within(async {
        loop {
            match peer.recv().await {
                Some(Frame::Text(text)) => {
                    return serde_json::from_str(&text).expect("server wrote invalid chat json")
                }
                Some(Frame::Ping) | Some(Frame::Pong) => continue,
                other => panic!("expected a chat frame, got {other:?}"),
            }
        }
    })
    .await
}

/// Assert `peer` receives no chat frame for `window`.
pub async fn expect_no_chat(peer: &mut MemoryPeer, window: Duration) {
    let outcome = tokio::time::timeout(window, async {
        loop {
            match peer.recv().await {
                Some(Frame::Ping) | Some(Frame::Pong) => continue,
                other => return other,
            }
        }
    })
    .await;
    if let Ok(frame) = outcome {
        panic!("expected silence, got {frame:?}");
    }
}

/// Drain `peer` until the server closes its side.
pub async fn expect_closed(peer: &mut MemoryPeer) {
    within(async {
        while let Some(frame) = peer.recv().await {
            if let Frame::Text(text) = frame {
                panic!("unexpected chat frame while waiting for close: {text}");
            }
        }
    })
    .await;
}

/// Poll until `check` holds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    within(async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
}
