//! In-process transport.
//!
//! [`pair`] returns the server half, handed to the hub like any other
//! transport, and a [`MemoryPeer`] that plays the remote client.

use std::pin::Pin;

use futures::channel::mpsc;
use futures::{Sink, SinkExt, StreamExt};

use super::{Frame, Transport, TransportError};

pub struct MemoryTransport {
    to_peer: mpsc::UnboundedSender<Frame>,
    from_peer: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
}

pub struct MemoryPeer {
    to_server: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    from_server: mpsc::UnboundedReceiver<Frame>,
}

pub fn pair() -> (MemoryTransport, MemoryPeer) {
    let (to_peer, from_server) = mpsc::unbounded();
    let (to_server, from_peer) = mpsc::unbounded();
    (
        MemoryTransport { to_peer, from_peer },
        MemoryPeer {
            to_server,
            from_server,
        },
    )
}

impl Transport for MemoryTransport {
    type Sink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;
    type Stream = mpsc::UnboundedReceiver<Result<Frame, TransportError>>;

    fn split(self) -> (Self::Sink, Self::Stream) {
        let sink = self.to_peer.sink_map_err(|_| TransportError::Closed);
        (Box::pin(sink), self.from_peer)
    }
}

impl MemoryPeer {
    pub fn send(&self, frame: Frame) -> Result<(), TransportError> {
        self.to_server
            .unbounded_send(Ok(frame))
            .map_err(|_| TransportError::Closed)
    }

    pub fn send_text(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.send(Frame::Text(text.into()))
    }

    /// Surface a read error on the server side.
    pub fn fail(&self, error: TransportError) -> Result<(), TransportError> {
        self.to_server
            .unbounded_send(Err(error))
            .map_err(|_| TransportError::Closed)
    }

    /// Next frame written by the server; `None` once the server dropped its sink.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.from_server.next().await
    }

    /// End the server's inbound stream as if the socket went away.
    pub fn hang_up(&self) {
        self.to_server.close_channel();
    }
}
