//! Room actor: the live member set of one room and the routing of its traffic.

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

use crate::event::{ChatMessage, Event};
use crate::mailbox::{Mailbox, MailboxClosed, Postbox};
use crate::registry::Registry;
use crate::settings::HubSettings;
use crate::store::MessageStore;
use crate::types::{Room, RoomId, UserId};

pub type MemberSet = Arc<HashSet<UserId>>;

/// Reference to a live room actor.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    room: Arc<Room>,
    postbox: Postbox<Event>,
    members: watch::Receiver<MemberSet>,
    shutdown: CancellationToken,
}

impl RoomHandle {
    pub fn id(&self) -> RoomId {
        self.room.id
    }

    pub fn room(&self) -> &Room {
        &self.room
    }

    pub async fn send(&self, event: Event) -> Result<(), MailboxClosed> {
        self.postbox.send(event).await
    }

    /// The member set as of the room's last membership change.
    pub fn members(&self) -> MemberSet {
        self.members.borrow().clone()
    }

    pub fn watch_members(&self) -> watch::Receiver<MemberSet> {
        self.members.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled() || self.postbox.is_closed()
    }

    pub(crate) fn stop(&self) {
        self.shutdown.cancel();
    }
}

pub(crate) struct RoomContext {
    pub registry: watch::Receiver<Arc<Registry>>,
    pub messages: Arc<dyn MessageStore>,
    pub settings: HubSettings,
    pub tracker: TaskTracker,
    pub shutdown: CancellationToken,
}

/// Start the dispatch worker for `room`, seeded with its persisted members.
pub(crate) fn spawn(
    room: Room,
    members: impl IntoIterator<Item = UserId>,
    ctx: &RoomContext,
) -> RoomHandle {
    let room = Arc::new(room);
    let members: HashSet<UserId> = members.into_iter().collect();
    let (published, observed) = watch::channel(Arc::new(members.clone()));
    let (postbox, mailbox) = ctx.settings.mailbox.channel();
    let shutdown = ctx.shutdown.child_token();

    let actor = ChatRoom {
        room: room.clone(),
        members,
        published,
        messages: ctx.messages.clone(),
        registry: ctx.registry.clone(),
    };
    let span = info_span!("room", room_id = %room.id);
    ctx.tracker
        .spawn(actor.run(mailbox, shutdown.clone()).instrument(span));

    RoomHandle {
        room,
        postbox,
        members: observed,
        shutdown,
    }
}

struct ChatRoom {
    room: Arc<Room>,
    members: HashSet<UserId>,
    published: watch::Sender<MemberSet>,
    messages: Arc<dyn MessageStore>,
    registry: watch::Receiver<Arc<Registry>>,
}

impl ChatRoom {
    async fn run(mut self, mut mailbox: Mailbox<Event>, shutdown: CancellationToken) {
        info!(name = %self.room.name, members = self.members.len(), "room started");

        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                event = mailbox.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            if self.handle(event).await.is_break() {
                break;
            }
        }

        mailbox.close();
        shutdown.cancel();
        info!("room stopped");
    }

    async fn handle(&mut self, event: Event) -> ControlFlow<()> {
        match event {
            Event::Message(message) => self.on_message(message).await,
            Event::UserJoinRoom { user_id, room_id } => {
                self.on_membership(user_id, room_id, true).await;
            }
            Event::UserLeaveRoom { user_id, room_id } => {
                self.on_membership(user_id, room_id, false).await;
            }
            Event::RoomDestroy { room_id } if room_id == self.room.id => {
                self.drain().await;
                return ControlFlow::Break(());
            }
            other => {
                warn!(event = other.name(), "room ignoring unexpected event");
            }
        }
        ControlFlow::Continue(())
    }

    async fn on_message(&mut self, message: Arc<ChatMessage>) {
        if message.room_id != self.room.id {
            warn!(target_room = %message.room_id, "dropping message addressed to another room");
            return;
        }
        if !self.members.contains(&message.user_id) {
            warn!(user_id = %message.user_id, "dropping message from non-member");
            return;
        }

        // Stored before anyone sees it.
        let saved = match self
            .messages
            .save_message(message.user_id, message.room_id, &message.body)
            .await
        {
            Ok(saved) => saved,
            Err(error) => {
                error!(user_id = %message.user_id, %error, "failed to persist message, dropping it");
                return;
            }
        };

        let delivered = Arc::new(ChatMessage {
            id: Some(saved.id),
            timestamp: saved.timestamp,
            ..ChatMessage::clone(&message)
        });

        let registry = self.registry.borrow().clone();
        for &member in &self.members {
            if member == message.user_id {
                continue;
            }
            let Some(connection) = registry.connection(member) else {
                trace!(user_id = %member, "member offline");
                continue;
            };
            if connection
                .send(Event::Message(delivered.clone()))
                .await
                .is_err()
            {
                debug!(user_id = %member, "connection closed during fan-out");
            }
        }
    }

    async fn on_membership(&mut self, user_id: UserId, room_id: RoomId, join: bool) {
        if room_id != self.room.id {
            warn!(%user_id, target_room = %room_id, "dropping membership change for another room");
            return;
        }

        let changed = if join {
            self.members.insert(user_id)
        } else {
            self.members.remove(&user_id)
        };

        if changed {
            self.publish();
            info!(%user_id, join, "membership changed");
        } else {
            debug!(%user_id, join, "membership already up to date");
        }

        // Acknowledge so the user's connection tracks the same view.
        let ack = if join {
            Event::UserJoinRoom { user_id, room_id }
        } else {
            Event::UserLeaveRoom { user_id, room_id }
        };
        self.notify(user_id, ack).await;
    }

    async fn drain(&mut self) {
        let room_id = self.room.id;
        let members: Vec<UserId> = self.members.drain().collect();
        self.publish();

        for user_id in members {
            self.notify(user_id, Event::UserLeaveRoom { user_id, room_id })
                .await;
        }
        info!("room destroyed");
    }

    async fn notify(&self, user_id: UserId, event: Event) {
        let connection = self.registry.borrow().connection(user_id).cloned();
        if let Some(connection) = connection {
            if connection.send(event).await.is_err() {
                debug!(%user_id, "connection closed before acknowledgement");
            }
        }
    }

    fn publish(&self) {
        self.published.send_replace(Arc::new(self.members.clone()));
    }
}
