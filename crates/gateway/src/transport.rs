//! axum websockets as a hub transport.

use std::future;
use std::pin::Pin;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use parlor_hub::{Frame, Transport, TransportError};

pub struct WebSocketTransport {
    socket: WebSocket,
}

impl WebSocketTransport {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

impl Transport for WebSocketTransport {
    type Sink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;
    type Stream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

    fn split(self) -> (Self::Sink, Self::Stream) {
        let (sink, stream) = self.socket.split();

        let sink = sink
            .sink_map_err(|e| TransportError::Io(e.to_string()))
            .with(|frame: Frame| future::ready(Ok::<_, TransportError>(to_message(frame))));

        let stream = stream.map(|message| match message {
            Ok(message) => from_message(message),
            Err(e) => Err(TransportError::Io(e.to_string())),
        });

        (Box::pin(sink), Box::pin(stream))
    }
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text),
        Frame::Ping => Message::Ping(Vec::new()),
        Frame::Pong => Message::Pong(Vec::new()),
        Frame::Close => Message::Close(None),
    }
}

fn from_message(message: Message) -> Result<Frame, TransportError> {
    match message {
        Message::Text(text) => Ok(Frame::Text(text)),
        Message::Ping(_) => Ok(Frame::Ping),
        Message::Pong(_) => Ok(Frame::Pong),
        Message::Close(_) => Ok(Frame::Close),
        Message::Binary(_) => Err(TransportError::Unsupported("binary frame")),
    }
}
