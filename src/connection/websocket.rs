//! WebSocket transport built on tokio-tungstenite.

use async_trait::async_trait;
use futures::{future, SinkExt, StreamExt};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::debug;

use super::transport::{FrameSink, FrameSource, InboundFrame, StreamTransport, TransportError};

/// Opens `ws://` / `wss://` links.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StreamTransport for WebSocketTransport {
    async fn open(&self, url: &str) -> Result<(FrameSink, FrameSource), TransportError> {
        let (ws_stream, response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        debug!("WebSocket handshake complete ({})", response.status());

        let (ws_tx, ws_rx) = ws_stream.split();

        let sink = ws_tx
            .with(|text: String| future::ready(Ok::<_, WsError>(WsMessage::Text(text))))
            .sink_map_err(|e| TransportError::Io(e.to_string()));

        // Control frames are handled by tungstenite itself; a Close frame is
        // followed by the end of the stream.
        let source = ws_rx.filter_map(|msg| {
            future::ready(match msg {
                Ok(WsMessage::Text(text)) => Some(Ok(InboundFrame::Text(text))),
                Ok(WsMessage::Binary(data)) => Some(Ok(InboundFrame::Binary(data))),
                Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_)) => None,
                Ok(WsMessage::Close(_)) => None,
                Err(WsError::ConnectionClosed) => None,
                Err(e) => Some(Err(TransportError::Io(e.to_string()))),
            })
        });

        Ok((Box::pin(sink), Box::pin(source)))
    }
}
