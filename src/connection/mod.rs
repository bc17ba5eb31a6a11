//! Streaming connection to the chat backend.
//!
//! - [`decoder`] turns inbound frames into [`StreamEvent`]s
//! - [`transport`] is the seam between the manager and the wire
//! - [`websocket`] is the production transport
//! - [`manager`] owns the connection lifecycle

mod decoder;
mod manager;
mod transport;
mod websocket;

pub use decoder::{decode_frame, decode_inbound, decode_or_fail, DecodeError, StreamEvent, DECODE_FAILURE};
pub use manager::{
    ConnectError, Connected, ConnectionEvents, ConnectionManager, ConnectionState, SendError,
};
pub use transport::{FrameSink, FrameSource, InboundFrame, StreamTransport, TransportError};
pub use websocket::WebSocketTransport;
