//! Transport seam for the streaming connection.
//!
//! The connection manager only ever sees a sink of outbound text frames and
//! a stream of inbound frames. The production transport is a WebSocket
//! (see [`super::websocket`]); tests plug in channel-backed fakes.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, Stream};
use thiserror::Error;

/// Outbound half of an open link.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Inbound half of an open link. Ends when the peer goes away.
pub type FrameSource = Pin<Box<dyn Stream<Item = Result<InboundFrame, TransportError>> + Send>>;

/// A frame as it arrived, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
}

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Transport I/O error: {0}")]
    Io(String),
    #[error("Connection closed")]
    Closed,
}

/// Something that can open a bidirectional frame link to a URL.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Open a link. Resolves once the peer has accepted the connection.
    async fn open(&self, url: &str) -> Result<(FrameSink, FrameSource), TransportError>;
}
