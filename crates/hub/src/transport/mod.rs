//! The network edge of a connection actor.
//!
//! A [`Transport`] is anything that can be split into a frame sink and a frame
//! stream. The gateway adapts axum websockets; [`memory`] provides an
//! in-process pair for tests and embedding.

pub mod memory;

use futures::{Sink, Stream};
use thiserror::Error;

/// One unit on the wire. Control frames carry no payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Ping,
    Pong,
    Close,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("frame of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("unsupported frame: {0}")]
    Unsupported(&'static str),

    #[error("connection closed")]
    Closed,

    #[error("transport error: {0}")]
    Io(String),
}

pub trait Transport: Send + 'static {
    type Sink: Sink<Frame, Error = TransportError> + Send + Unpin + 'static;
    type Stream: Stream<Item = Result<Frame, TransportError>> + Send + Unpin + 'static;

    fn split(self) -> (Self::Sink, Self::Stream);
}

/// Enforce the inbound size limit before anything looks at the payload.
pub(crate) fn check_frame_size(frame: &Frame, limit: usize) -> Result<(), TransportError> {
    match frame {
        Frame::Text(text) if text.len() > limit => Err(TransportError::FrameTooLarge {
            size: text.len(),
            limit,
        }),
        _ => Ok(()),
    }
}
