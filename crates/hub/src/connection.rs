//! Connection actor: one live transport bridged onto the event protocol.
//!
//! Three workers share a cancellation token and nothing else:
//!
//! * the reader decodes chat frames and forwards them to rooms,
//! * the writer drains the outbound queue and pings on a fixed interval,
//! * the dispatcher consumes the actor's mailbox and feeds the writer.
//!
//! Whichever worker stops first runs the teardown; later calls are no-ops.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::event::{ChatMessage, Event};
use crate::mailbox::{Mailbox, MailboxClosed, Postbox};
use crate::protocol::{InboundChat, OutboundChat, ProtocolError};
use crate::registry::Registry;
use crate::settings::HubSettings;
use crate::transport::{check_frame_size, Frame, Transport, TransportError};
use crate::types::{ConnectionId, User, UserId};

/// Reference to a live connection actor.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    user: Arc<User>,
    postbox: Postbox<Event>,
    shutdown: CancellationToken,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user.id
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub async fn send(&self, event: Event) -> Result<(), MailboxClosed> {
        self.postbox.send(event).await
    }

    /// Ask the actor to shut down. Returns without waiting for it.
    pub fn disconnect(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves once teardown has started.
    pub async fn closed(&self) {
        self.shutdown.cancelled().await;
    }
}

/// What a connection borrows from the hub that spawned it.
#[derive(Clone)]
pub(crate) struct ConnectionContext {
    pub hub: Postbox<Event>,
    pub registry: watch::Receiver<Arc<Registry>>,
    pub settings: HubSettings,
    pub tracker: TaskTracker,
    pub shutdown: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DisconnectReason {
    Requested,
    PeerClosed,
    ReadTimeout,
    ReadError,
    FrameTooLarge,
    Malformed,
    WriteError,
    WriteTimeout,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Requested => "requested",
            Self::PeerClosed => "peer closed",
            Self::ReadTimeout => "read deadline elapsed",
            Self::ReadError => "read error",
            Self::FrameTooLarge => "frame too large",
            Self::Malformed => "malformed frame",
            Self::WriteError => "write error",
            Self::WriteTimeout => "write deadline elapsed",
        };
        f.write_str(reason)
    }
}

struct Teardown {
    fired: AtomicBool,
    shutdown: CancellationToken,
    hub: Postbox<Event>,
    user_id: UserId,
    connection_id: ConnectionId,
}

impl Teardown {
    async fn run(&self, reason: DisconnectReason) {
        if self.fired.swap(true, Ordering::AcqRel) {
            return;
        }

        info!(%reason, "connection closing");
        self.shutdown.cancel();

        let event = Event::UserDisconnect {
            user_id: self.user_id,
            connection_id: self.connection_id,
        };
        if self.hub.send(event).await.is_err() {
            debug!("hub stopped before disconnect could be reported");
        }
    }
}

/// Start the three workers for `transport` and return the actor's handle.
///
/// Which rooms deliver here is decided by each room's member set alone.
pub(crate) fn spawn<T: Transport>(
    transport: T,
    id: ConnectionId,
    user: User,
    ctx: &ConnectionContext,
) -> ConnectionHandle {
    let user = Arc::new(user);
    let shutdown = ctx.shutdown.child_token();
    let (postbox, mailbox) = ctx.settings.mailbox.channel();
    let (outbound_tx, outbound_rx) = ctx.settings.mailbox.channel();
    let (sink, stream) = transport.split();

    let teardown = Arc::new(Teardown {
        fired: AtomicBool::new(false),
        shutdown: shutdown.clone(),
        hub: ctx.hub.clone(),
        user_id: user.id,
        connection_id: id,
    });
    let span = info_span!("connection", user_id = %user.id, connection_id = %id);

    ctx.tracker.spawn(
        {
            let teardown = teardown.clone();
            let reader = Reader {
                user: user.clone(),
                registry: ctx.registry.clone(),
                settings: ctx.settings,
                shutdown: shutdown.clone(),
            };
            async move {
                let reason = reader.run(stream).await;
                teardown.run(reason).await;
            }
        }
        .instrument(span.clone()),
    );

    ctx.tracker.spawn(
        {
            let teardown = teardown.clone();
            let settings = ctx.settings;
            let shutdown = shutdown.clone();
            async move {
                let reason = write_loop(sink, outbound_rx, settings, shutdown).await;
                teardown.run(reason).await;
            }
        }
        .instrument(span.clone()),
    );

    ctx.tracker.spawn(
        {
            let shutdown = shutdown.clone();
            let user_id = user.id;
            async move {
                let reason = dispatch_loop(mailbox, outbound_tx, user_id, shutdown).await;
                teardown.run(reason).await;
            }
        }
        .instrument(span.clone()),
    );

    span.in_scope(|| info!(username = %user.username, "connection opened"));

    ConnectionHandle {
        id,
        user,
        postbox,
        shutdown,
    }
}

struct Reader {
    user: Arc<User>,
    registry: watch::Receiver<Arc<Registry>>,
    settings: HubSettings,
    shutdown: CancellationToken,
}

impl Reader {
    async fn run<S>(self, mut stream: S) -> DisconnectReason
    where
        S: Stream<Item = Result<Frame, TransportError>> + Unpin,
    {
        loop {
            // A fresh deadline per read: any frame, pongs included, keeps the peer alive.
            let next = tokio::select! {
                _ = self.shutdown.cancelled() => return DisconnectReason::Requested,
                next = time::timeout(self.settings.pong_wait, stream.next()) => next,
            };

            let frame = match next {
                Err(_) => return DisconnectReason::ReadTimeout,
                Ok(None) => return DisconnectReason::PeerClosed,
                Ok(Some(Err(error))) => {
                    debug!(%error, "read failed");
                    return DisconnectReason::ReadError;
                }
                Ok(Some(Ok(frame))) => frame,
            };

            if let Err(error) = check_frame_size(&frame, self.settings.max_message_size) {
                warn!(%error, "rejecting inbound frame");
                return DisconnectReason::FrameTooLarge;
            }

            let text = match frame {
                Frame::Text(text) => text,
                Frame::Ping | Frame::Pong => continue,
                Frame::Close => return DisconnectReason::PeerClosed,
            };

            let chat = match InboundChat::decode(&text) {
                Ok(chat) => chat,
                Err(ProtocolError::EmptyBody) => {
                    debug!("dropping chat frame with empty body");
                    continue;
                }
                Err(error) => {
                    warn!(%error, "closing connection after malformed frame");
                    return DisconnectReason::Malformed;
                }
            };

            if self.forward(chat).await.is_err() {
                return DisconnectReason::Requested;
            }
        }
    }

    /// Hand a decoded frame to its room. Errs only when shutdown interrupts the send.
    async fn forward(&self, chat: InboundChat) -> Result<(), ()> {
        let room = self.registry.borrow().room(chat.room_id).cloned();
        let Some(room) = room else {
            warn!(room_id = %chat.room_id, "dropping chat frame for unknown room");
            return Ok(());
        };

        let message = Arc::new(ChatMessage {
            id: None,
            room_id: chat.room_id,
            user_id: self.user.id,
            username: self.user.username.clone(),
            body: chat.body,
            timestamp: Utc::now(),
        });

        tokio::select! {
            _ = self.shutdown.cancelled() => Err(()),
            sent = room.send(Event::Message(message)) => {
                if sent.is_err() {
                    debug!(room_id = %chat.room_id, "room stopped before message was delivered");
                }
                Ok(())
            }
        }
    }
}

async fn write_loop<K>(
    mut sink: K,
    mut outbound: Mailbox<Arc<ChatMessage>>,
    settings: HubSettings,
    shutdown: CancellationToken,
) -> DisconnectReason
where
    K: Sink<Frame, Error = TransportError> + Unpin,
{
    let mut ticker = time::interval_at(
        Instant::now() + settings.ping_interval,
        settings.ping_interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let reason = loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break DisconnectReason::Requested,
            message = outbound.recv() => match message {
                Some(message) => match serde_json::to_string(&OutboundChat::from(message.as_ref())) {
                    Ok(text) => Frame::Text(text),
                    Err(error) => {
                        warn!(%error, "failed to encode outbound chat frame");
                        continue;
                    }
                },
                None => break DisconnectReason::Requested,
            },
            _ = ticker.tick() => Frame::Ping,
        };

        match time::timeout(settings.write_wait, sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                debug!(%error, "write failed");
                break DisconnectReason::WriteError;
            }
            Err(_) => break DisconnectReason::WriteTimeout,
        }
    };

    // The writer owns the sink, so this is the only place the transport is closed.
    let close = async {
        sink.send(Frame::Close).await?;
        sink.close().await
    };
    if let Ok(Err(error)) = time::timeout(settings.write_wait, close).await {
        debug!(%error, "close frame not delivered");
    }

    reason
}

async fn dispatch_loop(
    mut mailbox: Mailbox<Event>,
    outbound: Postbox<Arc<ChatMessage>>,
    user_id: UserId,
    shutdown: CancellationToken,
) -> DisconnectReason {
    let reason = loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break DisconnectReason::Requested,
            event = mailbox.recv() => match event {
                Some(event) => event,
                None => break DisconnectReason::Requested,
            },
        };

        match event {
            Event::Message(message) => {
                tokio::select! {
                    _ = shutdown.cancelled() => break DisconnectReason::Requested,
                    sent = outbound.send(message) => {
                        if sent.is_err() {
                            break DisconnectReason::Requested;
                        }
                    }
                }
            }
            Event::UserJoinRoom { user_id: member, room_id } if member == user_id => {
                debug!(%room_id, "joined room");
            }
            Event::UserLeaveRoom { user_id: member, room_id } if member == user_id => {
                debug!(%room_id, "left room");
            }
            other => {
                warn!(event = other.name(), "connection ignoring unexpected event");
            }
        }
    };

    // Refuse further deliveries before teardown waits on the hub.
    mailbox.close();
    drop(mailbox);
    reason
}
