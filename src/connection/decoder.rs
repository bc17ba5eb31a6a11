//! Frame decoding for the streaming connection.

use thiserror::Error;

use super::transport::InboundFrame;
use crate::protocol::ServerFrame;

/// Text reported when an inbound frame can't be decoded.
pub const DECODE_FAILURE: &str = "decode failure";

/// Decoded form of one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A piece of assistant text.
    Chunk(String),
    /// End of stream. Carries the backend's optional context payload.
    Complete(Option<serde_json::Value>),
    /// The backend (or the decoder) gave up on this stream.
    Error(String),
}

impl StreamEvent {
    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Chunk(_))
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Invalid frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unexpected binary frame ({0} bytes)")]
    Binary(usize),
}

/// Decode a text frame.
pub fn decode_frame(text: &str) -> Result<StreamEvent, DecodeError> {
    let frame: ServerFrame = serde_json::from_str(text)?;
    Ok(match frame {
        ServerFrame::Chunk { content } => StreamEvent::Chunk(content),
        ServerFrame::Complete { context } => StreamEvent::Complete(context),
        ServerFrame::Error { content, error } => StreamEvent::Error(
            content
                .or(error)
                .unwrap_or_else(|| "Unknown error".to_string()),
        ),
    })
}

/// Decode any inbound frame. The protocol has no binary frames.
pub fn decode_inbound(frame: &InboundFrame) -> Result<StreamEvent, DecodeError> {
    match frame {
        InboundFrame::Text(text) => decode_frame(text),
        InboundFrame::Binary(data) => Err(DecodeError::Binary(data.len())),
    }
}

/// Decode an inbound frame, folding failures into a terminal error event.
///
/// A bad frame abandons the stream; it is never skipped.
pub fn decode_or_fail(frame: &InboundFrame) -> StreamEvent {
    match decode_inbound(frame) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("Dropping stream after undecodable frame: {}", e);
            StreamEvent::Error(DECODE_FAILURE.to_string())
        }
    }
}
