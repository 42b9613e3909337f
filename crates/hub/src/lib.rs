//! Actor core of the parlor chat hub.
//!
//! A [`Hub`] owns the registry of live actors. Each persisted room runs as a
//! room actor that persists and fans out chat messages; each connected user
//! runs as a connection actor bridging one [`Transport`] onto the [`Event`]
//! protocol. Actors share no mutable state: they exchange events through
//! their mailboxes and look each other up in registry snapshots published by
//! the hub worker.

pub mod connection;
pub mod error;
pub mod event;
pub mod hub;
pub mod mailbox;
pub mod protocol;
pub mod registry;
pub mod room;
pub mod settings;
pub mod store;
pub mod transport;
pub mod types;

pub use connection::ConnectionHandle;
pub use error::{HubError, HubResult};
pub use event::{ChatMessage, Event};
pub use hub::Hub;
pub use mailbox::{MailboxClosed, MailboxPolicy};
pub use protocol::{InboundChat, OutboundChat, ProtocolError};
pub use registry::Registry;
pub use room::{MemberSet, RoomHandle};
pub use settings::HubSettings;
pub use store::{
    ChatStores, IdentityStore, MembershipStore, MessageStore, RoomStore, SessionStore, StoreError,
    StoreResult,
};
pub use transport::{Frame, Transport, TransportError};
pub use types::{ConnectionId, Message, MessageId, Room, RoomId, Session, User, UserId};
