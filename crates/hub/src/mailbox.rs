//! Actor mailboxes.
//!
//! Every actor owns exactly one [`Mailbox`]; everyone else holds a cloned
//! [`Postbox`]. Whether the pair is bounded is decided once from
//! [`MailboxKind`] so all actors in a hub share the same policy.

use parlor_config::{ChatConfig, MailboxKind};
use thiserror::Error;
use tokio::sync::mpsc;

/// The receiving actor has stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("mailbox closed")]
pub struct MailboxClosed;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxPolicy {
    Bounded(usize),
    Unbounded,
}

impl MailboxPolicy {
    pub fn from_config(config: &ChatConfig) -> Self {
        match config.mailbox {
            MailboxKind::Bounded => Self::Bounded(config.mailbox_capacity.max(1)),
            MailboxKind::Unbounded => Self::Unbounded,
        }
    }

    pub fn channel<T>(self) -> (Postbox<T>, Mailbox<T>) {
        match self {
            Self::Bounded(capacity) => {
                let (tx, rx) = mpsc::channel(capacity);
                (Postbox::Bounded(tx), Mailbox::Bounded(rx))
            }
            Self::Unbounded => {
                let (tx, rx) = mpsc::unbounded_channel();
                (Postbox::Unbounded(tx), Mailbox::Unbounded(rx))
            }
        }
    }
}

/// Sending half of an actor mailbox.
#[derive(Debug)]
pub enum Postbox<T> {
    Bounded(mpsc::Sender<T>),
    Unbounded(mpsc::UnboundedSender<T>),
}

impl<T> Clone for Postbox<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Bounded(tx) => Self::Bounded(tx.clone()),
            Self::Unbounded(tx) => Self::Unbounded(tx.clone()),
        }
    }
}

impl<T> Postbox<T> {
    /// Deliver `item`, waiting for room in a bounded mailbox.
    pub async fn send(&self, item: T) -> Result<(), MailboxClosed> {
        match self {
            Self::Bounded(tx) => tx.send(item).await.map_err(|_| MailboxClosed),
            Self::Unbounded(tx) => tx.send(item).map_err(|_| MailboxClosed),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            Self::Bounded(tx) => tx.is_closed(),
            Self::Unbounded(tx) => tx.is_closed(),
        }
    }
}

/// Receiving half of an actor mailbox. Owned by exactly one worker.
#[derive(Debug)]
pub enum Mailbox<T> {
    Bounded(mpsc::Receiver<T>),
    Unbounded(mpsc::UnboundedReceiver<T>),
}

impl<T> Mailbox<T> {
    pub async fn recv(&mut self) -> Option<T> {
        match self {
            Self::Bounded(rx) => rx.recv().await,
            Self::Unbounded(rx) => rx.recv().await,
        }
    }

    /// Refuse further sends; already queued items can still be received.
    pub fn close(&mut self) {
        match self {
            Self::Bounded(rx) => rx.close(),
            Self::Unbounded(rx) => rx.close(),
        }
    }
}
