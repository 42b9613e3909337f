//! The hub: sole owner of the registry of live connections and rooms.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parlor_config::ChatConfig;
use tokio::sync::watch;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::connection::{self, ConnectionContext, ConnectionHandle};
use crate::error::{HubError, HubResult};
use crate::event::Event;
use crate::mailbox::{Mailbox, Postbox};
use crate::registry::Registry;
use crate::room::{self, RoomContext, RoomHandle};
use crate::settings::HubSettings;
use crate::store::ChatStores;
use crate::transport::Transport;
use crate::types::{ConnectionId, RoomId, User, UserId};

/// Entry point into the actor system.
///
/// Cloning is cheap; every clone talks to the same hub worker.
#[derive(Clone)]
pub struct Hub {
    postbox: Postbox<Event>,
    registry: watch::Receiver<Arc<Registry>>,
    stores: ChatStores,
    settings: HubSettings,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    next_connection_id: Arc<AtomicU64>,
}

impl Hub {
    /// Start a room actor for every persisted room, then the hub worker.
    ///
    /// Returns once the registry holds all rooms, so connections accepted
    /// afterwards can route to any of them.
    pub async fn start(stores: ChatStores, config: &ChatConfig) -> HubResult<Self> {
        let settings = HubSettings::from_config(config)?;

        let mut persisted = Vec::new();
        for room in stores.rooms.list_rooms().await? {
            let members = stores.memberships.list_members(room.id).await?;
            persisted.push((room, members));
        }

        let (postbox, mailbox) = settings.mailbox.channel();
        let (published, registry_rx) = watch::channel(Arc::new(Registry::default()));
        let tracker = TaskTracker::new();
        let shutdown = CancellationToken::new();

        let hub = Self {
            postbox,
            registry: registry_rx,
            stores,
            settings,
            tracker,
            shutdown,
            next_connection_id: Arc::new(AtomicU64::new(1)),
        };

        let mut registry = Registry::default();
        let room_ctx = hub.room_context();
        for (room, members) in persisted {
            let handle = room::spawn(room, members, &room_ctx);
            registry.rooms.insert(handle.id(), handle);
        }
        let room_count = registry.room_count();
        published.send_replace(Arc::new(registry.clone()));

        let worker = HubWorker {
            registry,
            published,
        };
        hub.tracker.spawn(
            worker
                .run(mailbox, hub.shutdown.clone())
                .instrument(info_span!("hub")),
        );

        info!(rooms = room_count, "chat hub started");
        Ok(hub)
    }

    /// Attach an authenticated transport.
    ///
    /// A connection already live for the same user is told to disconnect and
    /// replaced. Returns after the hub has registered the new connection.
    pub async fn user_connect<T: Transport>(
        &self,
        transport: T,
        user: User,
    ) -> HubResult<ConnectionHandle> {
        if self.shutdown.is_cancelled() {
            return Err(HubError::Stopped);
        }

        let id = ConnectionId(self.next_connection_id.fetch_add(1, Ordering::Relaxed));
        let handle = connection::spawn(transport, id, user, &self.connection_context());

        if self
            .postbox
            .send(Event::UserConnect(handle.clone()))
            .await
            .is_err()
        {
            handle.disconnect();
            return Err(HubError::Stopped);
        }

        let user_id = handle.user_id();
        let settled = self
            .registry
            .clone()
            .wait_for(|registry| {
                handle.is_closed()
                    || registry.connection(user_id).map(ConnectionHandle::id) == Some(id)
            })
            .await
            .is_ok();
        if !settled {
            handle.disconnect();
            return Err(HubError::Stopped);
        }

        Ok(handle)
    }

    /// Ask the live connection of `user_id`, if any, to close.
    pub fn disconnect_user(&self, user_id: UserId) -> bool {
        let connection = self.registry.borrow().connection(user_id).cloned();
        match connection {
            Some(connection) => {
                connection.disconnect();
                true
            }
            None => false,
        }
    }

    /// Bring a freshly persisted room to life with no members.
    pub async fn room_create(&self, room_id: RoomId) -> HubResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(HubError::Stopped);
        }

        let room = self.stores.rooms.find_room(room_id).await?;
        let handle = room::spawn(room, Vec::new(), &self.room_context());

        if self
            .postbox
            .send(Event::RoomCreate(handle.clone()))
            .await
            .is_err()
        {
            handle.stop();
            return Err(HubError::Stopped);
        }

        self.registry
            .clone()
            .wait_for(|registry| registry.room(room_id).is_some())
            .await
            .map_err(|_| HubError::Stopped)?;
        Ok(())
    }

    /// Tear a live room down; its members' connections are told they left.
    pub async fn room_destroy(&self, room_id: RoomId) -> HubResult<()> {
        if self.registry.borrow().room(room_id).is_none() {
            return Err(HubError::RoomNotFound(room_id));
        }

        self.postbox
            .send(Event::RoomDestroy { room_id })
            .await
            .map_err(|_| HubError::Stopped)?;

        self.registry
            .clone()
            .wait_for(|registry| registry.room(room_id).is_none())
            .await
            .map_err(|_| HubError::Stopped)?;
        Ok(())
    }

    pub async fn user_join_room(&self, user_id: UserId, room_id: RoomId) -> HubResult<()> {
        self.change_membership(user_id, room_id, true).await
    }

    pub async fn user_leave_room(&self, user_id: UserId, room_id: RoomId) -> HubResult<()> {
        self.change_membership(user_id, room_id, false).await
    }

    async fn change_membership(&self, user_id: UserId, room_id: RoomId, join: bool) -> HubResult<()> {
        let room = self
            .registry
            .borrow()
            .room(room_id)
            .cloned()
            .ok_or(HubError::RoomNotFound(room_id))?;

        let event = if join {
            Event::UserJoinRoom { user_id, room_id }
        } else {
            Event::UserLeaveRoom { user_id, room_id }
        };
        room.send(event)
            .await
            .map_err(|_| HubError::RoomNotFound(room_id))?;

        // A concurrent opposite change can hide ours from the snapshot; once
        // queued the event is applied regardless, so only wait a bounded time.
        let mut members = room.watch_members();
        let observed = async {
            members
                .wait_for(|members| members.contains(&user_id) == join)
                .await
                .map(|_| ())
        };
        let outcome = time::timeout(self.settings.write_wait, observed).await;
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(HubError::RoomNotFound(room_id)),
            Err(_) => {
                debug!(%user_id, %room_id, join, "membership change queued but not yet observed");
                Ok(())
            }
        }
    }

    /// The registry as last published by the hub worker.
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.borrow().clone()
    }

    pub fn watch_registry(&self) -> watch::Receiver<Arc<Registry>> {
        self.registry.clone()
    }

    pub fn settings(&self) -> &HubSettings {
        &self.settings
    }

    /// Signal every actor to stop and wait until all of their workers exited.
    pub async fn shutdown(&self) {
        info!("chat hub shutting down");
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("chat hub stopped");
    }

    fn connection_context(&self) -> ConnectionContext {
        ConnectionContext {
            hub: self.postbox.clone(),
            registry: self.registry.clone(),
            settings: self.settings,
            tracker: self.tracker.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    fn room_context(&self) -> RoomContext {
        RoomContext {
            registry: self.registry.clone(),
            messages: self.stores.messages.clone(),
            settings: self.settings,
            tracker: self.tracker.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

/// The single writer of the registry.
struct HubWorker {
    registry: Registry,
    published: watch::Sender<Arc<Registry>>,
}

impl HubWorker {
    async fn run(mut self, mut mailbox: Mailbox<Event>, shutdown: CancellationToken) {
        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                event = mailbox.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.handle(event).await;
        }

        mailbox.close();
        info!(
            connections = self.registry.connection_count(),
            rooms = self.registry.room_count(),
            "hub worker stopped"
        );
    }

    async fn handle(&mut self, event: Event) {
        match event {
            Event::UserConnect(handle) => self.on_connect(handle),
            Event::UserDisconnect {
                user_id,
                connection_id,
            } => self.on_disconnect(user_id, connection_id),
            Event::RoomCreate(handle) => self.on_room_create(handle),
            Event::RoomDestroy { room_id } => self.on_room_destroy(room_id).await,
            other => warn!(event = other.name(), "hub ignoring unexpected event"),
        }
    }

    fn on_connect(&mut self, handle: ConnectionHandle) {
        let user_id = handle.user_id();

        if handle.is_closed() {
            debug!(%user_id, connection_id = %handle.id(), "connection closed before registration");
            // Wake the caller waiting in user_connect.
            self.publish();
            return;
        }

        if let Some(stale) = self.registry.connections.remove(&user_id) {
            info!(%user_id, stale = %stale.id(), fresh = %handle.id(), "superseding live connection");
            stale.disconnect();
        }

        info!(%user_id, connection_id = %handle.id(), "user connected");
        self.registry.connections.insert(user_id, handle);
        self.publish();
    }

    fn on_disconnect(&mut self, user_id: UserId, connection_id: ConnectionId) {
        let current = self.registry.connection(user_id).map(ConnectionHandle::id);
        if current != Some(connection_id) {
            debug!(%user_id, %connection_id, "ignoring disconnect of a superseded connection");
            return;
        }

        self.registry.connections.remove(&user_id);
        self.publish();
        info!(%user_id, %connection_id, "user disconnected");
    }

    fn on_room_create(&mut self, handle: RoomHandle) {
        let room_id = handle.id();
        if self.registry.rooms.contains_key(&room_id) {
            warn!(%room_id, "room already live, discarding duplicate actor");
            handle.stop();
            return;
        }

        self.registry.rooms.insert(room_id, handle);
        self.publish();
        info!(%room_id, "room registered");
    }

    async fn on_room_destroy(&mut self, room_id: RoomId) {
        let Some(room) = self.registry.rooms.remove(&room_id) else {
            debug!(%room_id, "destroy for a room that is not live");
            return;
        };
        self.publish();

        if room.send(Event::RoomDestroy { room_id }).await.is_err() {
            debug!(%room_id, "room actor already stopped");
        }
        info!(%room_id, "room deregistered");
    }

    fn publish(&self) {
        self.published.send_replace(Arc::new(self.registry.clone()));
    }
}
