//! Lifecycle of the single streaming connection.
//!
//! State machine:
//!
//! ```text
//! Idle ──connect──▶ Connecting ──open──▶ Open ──complete──▶ Closed
//!                       │                 │ └──error/close──▶ Errored
//!                       │                 └──disconnect──▶ Closing ──▶ Closed
//!                       ├──timeout──▶ Closed
//!                       └──transport error──▶ Errored
//! ```
//!
//! Each open link is driven by one spawned task that owns both halves of
//! the link. Outbound frames reach it over an mpsc channel; decoded events
//! leave it over another. Every connect bumps a generation counter so a
//! task (or a pending connect) from an older generation can never touch
//! the state of a newer one.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::decoder::{decode_or_fail, StreamEvent};
use super::transport::{FrameSink, FrameSource, StreamTransport, TransportError};
use crate::protocol::ClientFrame;

/// How long `disconnect` waits for the link to close cleanly.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
    Errored,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
            ConnectionState::Errored => "errored",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Connection attempt timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Another connection attempt is already in progress")]
    AlreadyConnecting,
    #[error("Connection attempt was cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("Not connected")]
    NotConnected,
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Receiver for decoded events of one connection.
///
/// Yields any number of [`StreamEvent::Chunk`]s followed by exactly one
/// terminal event, then `None`.
pub struct ConnectionEvents {
    rx: mpsc::UnboundedReceiver<StreamEvent>,
}

impl ConnectionEvents {
    /// Receive the next event. `None` once the connection task has exited.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    /// Drop anything already buffered.
    pub fn discard_pending(&mut self) -> usize {
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }
}

/// A successfully opened connection.
pub struct Connected {
    pub thread_id: String,
    pub events: ConnectionEvents,
}

impl std::fmt::Debug for Connected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connected")
            .field("thread_id", &self.thread_id)
            .finish_non_exhaustive()
    }
}

struct ActiveLink {
    thread_id: String,
    outbound: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

struct Shared {
    state: ConnectionState,
    generation: u64,
    active: Option<ActiveLink>,
}

/// Owns at most one open streaming connection.
///
/// Cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    transport: Arc<dyn StreamTransport>,
    ws_base: Url,
    connect_timeout: Duration,
    shared: Arc<Mutex<Shared>>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn StreamTransport>, ws_base: Url, connect_timeout: Duration) -> Self {
        Self {
            transport,
            ws_base,
            connect_timeout,
            shared: Arc::new(Mutex::new(Shared {
                state: ConnectionState::Idle,
                generation: 0,
                active: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        lock_shared(&self.shared)
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Thread the open connection is bound to.
    pub fn thread_id(&self) -> Option<String> {
        let shared = self.lock();
        match shared.state {
            ConnectionState::Open => shared.active.as_ref().map(|a| a.thread_id.clone()),
            _ => None,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// URL of the streaming endpoint for a thread.
    pub fn url_for(&self, thread_id: &str) -> Url {
        let mut url = self.ws_base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["ws", "chat", thread_id]);
        }
        url
    }

    /// Open a connection for `thread_id`, replacing any open one.
    pub async fn connect(&self, thread_id: &str) -> Result<Connected, ConnectError> {
        let (generation, prior) = {
            let mut shared = self.lock();
            if shared.state == ConnectionState::Connecting {
                return Err(ConnectError::AlreadyConnecting);
            }
            shared.generation += 1;
            shared.state = ConnectionState::Connecting;
            (shared.generation, shared.active.take())
        };

        let guard = PendingConnect {
            shared: &self.shared,
            generation,
        };

        if let Some(prior) = prior {
            debug!("Replacing connection for thread {}", prior.thread_id);
            close_link(prior).await;
        }

        let url = self.url_for(thread_id);
        info!("Connecting to {}", url);

        let opened = tokio::time::timeout(self.connect_timeout, self.transport.open(url.as_str())).await;

        let (sink, source) = match opened {
            Err(_) => {
                warn!("Connect to thread {} timed out after {:?}", thread_id, self.connect_timeout);
                guard.settle(ConnectionState::Closed);
                return Err(ConnectError::Timeout(self.connect_timeout));
            }
            Ok(Err(e)) => {
                warn!("Connect to thread {} failed: {}", thread_id, e);
                guard.settle(ConnectionState::Errored);
                return Err(ConnectError::Transport(e));
            }
            Ok(Ok(link)) => link,
        };

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (ev_tx, ev_rx) = mpsc::unbounded_channel();

        let superseded = {
            let mut shared = self.lock();
            if shared.generation != generation {
                // disconnect() ran while we were waiting for the handshake
                Some(sink)
            } else {
                let task = tokio::spawn(drive_link(
                    sink,
                    source,
                    out_rx,
                    ev_tx,
                    Arc::downgrade(&self.shared),
                    generation,
                ));
                shared.state = ConnectionState::Open;
                shared.active = Some(ActiveLink {
                    thread_id: thread_id.to_string(),
                    outbound: out_tx,
                    task,
                });
                None
            }
        };
        if let Some(mut sink) = superseded {
            let _ = sink.close().await;
            return Err(ConnectError::Cancelled);
        }
        guard.disarm();

        info!("Streaming connection open for thread {}", thread_id);
        Ok(Connected {
            thread_id: thread_id.to_string(),
            events: ConnectionEvents { rx: ev_rx },
        })
    }

    /// Queue a message on the open connection.
    ///
    /// Write failures surface later as a terminal error event.
    pub fn send(&self, thread_id: &str, text: &str, is_continuation: bool) -> Result<(), SendError> {
        let shared = self.lock();
        let active = match (&shared.state, &shared.active) {
            (ConnectionState::Open, Some(active)) if active.thread_id == thread_id => active,
            _ => return Err(SendError::NotConnected),
        };

        let frame = ClientFrame {
            message: text.to_string(),
            thread_id: Some(thread_id.to_string()),
            is_first_message: !is_continuation,
        };
        let payload =
            serde_json::to_string(&frame).map_err(|e| SendError::Transport(e.to_string()))?;

        active
            .outbound
            .send(payload)
            .map_err(|_| SendError::Transport("connection task has stopped".to_string()))?;
        debug!(
            "Queued {} message for thread {}",
            if is_continuation { "continuation" } else { "first" },
            thread_id
        );
        Ok(())
    }

    /// Close the open connection, if any. Safe to call at any time.
    pub async fn disconnect(&self) {
        let active = {
            let mut shared = self.lock();
            shared.generation += 1;
            match shared.active.take() {
                Some(active) => {
                    shared.state = ConnectionState::Closing;
                    Some(active)
                }
                None => {
                    // Also settles a close whose caller went away mid-way
                    if matches!(
                        shared.state,
                        ConnectionState::Connecting | ConnectionState::Closing
                    ) {
                        shared.state = ConnectionState::Closed;
                    }
                    None
                }
            }
        };

        let Some(active) = active else {
            return;
        };

        info!("Disconnecting from thread {}", active.thread_id);
        close_link(active).await;

        let mut shared = self.lock();
        if shared.state == ConnectionState::Closing {
            shared.state = ConnectionState::Closed;
        }
    }
}

fn lock_shared(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    // A panic while holding the lock leaves plain data behind; keep going.
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Resets a `Connecting` state if the connect future is dropped midway.
struct PendingConnect<'a> {
    shared: &'a Mutex<Shared>,
    generation: u64,
}

impl PendingConnect<'_> {
    fn settle(self, state: ConnectionState) {
        {
            let mut shared = lock_shared(self.shared);
            if shared.generation == self.generation {
                shared.state = state;
            }
        }
        std::mem::forget(self);
    }

    fn disarm(self) {
        std::mem::forget(self);
    }
}

impl Drop for PendingConnect<'_> {
    fn drop(&mut self) {
        let mut shared = lock_shared(self.shared);
        if shared.generation == self.generation && shared.state == ConnectionState::Connecting {
            shared.state = ConnectionState::Idle;
        }
    }
}

async fn close_link(active: ActiveLink) {
    let ActiveLink { outbound, mut task, .. } = active;
    // Dropping the sender tells the task to close the link and exit.
    drop(outbound);
    if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
        warn!("Connection task did not exit in {:?}, aborting", CLOSE_GRACE);
        task.abort();
    }
}

/// Pump frames both ways until a terminal event or a close request.
async fn drive_link(
    mut sink: FrameSink,
    mut source: FrameSource,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<StreamEvent>,
    shared: Weak<Mutex<Shared>>,
    generation: u64,
) {
    let final_state = loop {
        tokio::select! {
            next = outbound.recv() => match next {
                Some(payload) => {
                    if let Err(e) = sink.send(payload).await {
                        let _ = events.send(StreamEvent::Error(e.to_string()));
                        break ConnectionState::Errored;
                    }
                }
                None => {
                    let _ = sink.close().await;
                    debug!("Connection closed on request");
                    return;
                }
            },
            inbound = source.next() => {
                let event = match inbound {
                    Some(Ok(frame)) => decode_or_fail(&frame),
                    Some(Err(e)) => StreamEvent::Error(e.to_string()),
                    None => StreamEvent::Error(TransportError::Closed.to_string()),
                };

                let state = match &event {
                    StreamEvent::Chunk(_) => None,
                    StreamEvent::Complete(_) => Some(ConnectionState::Closed),
                    StreamEvent::Error(_) => Some(ConnectionState::Errored),
                };
                let _ = events.send(event);
                if let Some(state) = state {
                    break state;
                }
            }
        }
    };

    let _ = sink.close().await;
    debug!("Connection reached terminal state: {}", final_state);

    if let Some(shared) = shared.upgrade() {
        let mut shared = lock_shared(&shared);
        if shared.generation == generation {
            shared.state = final_state;
            shared.active = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{InboundFrame, DECODE_FAILURE};
    use async_trait::async_trait;
    use futures::channel::mpsc as fmpsc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // =========================================================================
    // Test Transports
    // =========================================================================

    /// Test-side ends of a fake link.
    struct Peer {
        /// Frames the client sent.
        from_client: fmpsc::UnboundedReceiver<String>,
        /// Push frames to the client.
        to_client: fmpsc::UnboundedSender<Result<InboundFrame, TransportError>>,
    }

    impl Peer {
        fn push(&self, text: &str) {
            self.to_client
                .unbounded_send(Ok(InboundFrame::Text(text.to_string())))
                .unwrap();
        }
    }

    /// Hands out channel-backed links and keeps the peer ends.
    struct FakeTransport {
        peers: Mutex<Vec<Peer>>,
        opens: AtomicUsize,
    }

    impl FakeTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                peers: Mutex::new(Vec::new()),
                opens: AtomicUsize::new(0),
            })
        }

        fn take_peer(&self) -> Peer {
            self.peers.lock().unwrap().remove(0)
        }
    }

    #[async_trait]
    impl StreamTransport for FakeTransport {
        async fn open(&self, _url: &str) -> Result<(FrameSink, FrameSource), TransportError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let (client_tx, from_client) = fmpsc::unbounded::<String>();
            let (to_client, client_rx) = fmpsc::unbounded();
            self.peers.lock().unwrap().push(Peer {
                from_client,
                to_client,
            });
            let sink = client_tx.sink_map_err(|_| TransportError::Closed);
            Ok((Box::pin(sink), Box::pin(client_rx)))
        }
    }

    /// Never finishes the handshake.
    struct HangingTransport;

    #[async_trait]
    impl StreamTransport for HangingTransport {
        async fn open(&self, _url: &str) -> Result<(FrameSink, FrameSource), TransportError> {
            futures::future::pending().await
        }
    }

    /// Refuses every connection.
    struct RefusingTransport;

    #[async_trait]
    impl StreamTransport for RefusingTransport {
        async fn open(&self, _url: &str) -> Result<(FrameSink, FrameSource), TransportError> {
            Err(TransportError::Connect("connection refused".into()))
        }
    }

    fn manager(transport: Arc<dyn StreamTransport>) -> ConnectionManager {
        ConnectionManager::new(
            transport,
            Url::parse("ws://localhost:8001").unwrap(),
            Duration::from_secs(5),
        )
    }

    // =========================================================================
    // URL Tests
    // =========================================================================

    #[test]
    fn test_url_for_thread() {
        let m = manager(FakeTransport::new());
        assert_eq!(m.url_for("t1").as_str(), "ws://localhost:8001/ws/chat/t1");
    }

    #[test]
    fn test_url_for_keeps_base_path_and_escapes() {
        let m = ConnectionManager::new(
            FakeTransport::new(),
            Url::parse("wss://example.com/backend/").unwrap(),
            Duration::from_secs(5),
        );
        assert_eq!(
            m.url_for("a b/c").as_str(),
            "wss://example.com/backend/ws/chat/a%20b%2Fc"
        );
    }

    // =========================================================================
    // Connect Tests
    // =========================================================================

    #[tokio::test]
    async fn test_connect_opens() {
        let transport = FakeTransport::new();
        let m = manager(transport.clone());
        assert_eq!(m.state(), ConnectionState::Idle);

        let connected = m.connect("t1").await.unwrap();
        assert_eq!(connected.thread_id, "t1");
        assert_eq!(m.state(), ConnectionState::Open);
        assert!(m.is_connected());
        assert_eq!(m.thread_id().as_deref(), Some("t1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_times_out() {
        let m = manager(Arc::new(HangingTransport));
        let started = tokio::time::Instant::now();

        let result = m.connect("t1").await;

        assert!(matches!(result, Err(ConnectError::Timeout(d)) if d == Duration::from_secs(5)));
        assert_eq!(started.elapsed(), Duration::from_secs(5));
        assert_eq!(m.state(), ConnectionState::Closed);
        assert!(!m.is_connected());
    }

    #[tokio::test]
    async fn test_connect_transport_failure() {
        let m = manager(Arc::new(RefusingTransport));
        let result = m.connect("t1").await;
        assert!(matches!(result, Err(ConnectError::Transport(TransportError::Connect(_)))));
        assert_eq!(m.state(), ConnectionState::Errored);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_connect_while_connecting_is_rejected() {
        let m = manager(Arc::new(HangingTransport));
        let m2 = m.clone();
        let pending = tokio::spawn(async move { m2.connect("t1").await });
        tokio::task::yield_now().await;

        assert_eq!(m.state(), ConnectionState::Connecting);
        assert!(matches!(
            m.connect("t2").await,
            Err(ConnectError::AlreadyConnecting)
        ));

        assert!(matches!(
            pending.await.unwrap(),
            Err(ConnectError::Timeout(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_connect_resets_state() {
        let m = manager(Arc::new(HangingTransport));
        {
            let fut = m.connect("t1");
            let _ = tokio::time::timeout(Duration::from_millis(10), fut).await;
        }
        assert_eq!(m.state(), ConnectionState::Idle);
        // Not wedged in Connecting
        assert!(matches!(
            m.connect("t1").await,
            Err(ConnectError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_replaces_prior_connection() {
        let transport = FakeTransport::new();
        let m = manager(transport.clone());

        let mut first = m.connect("t1").await.unwrap();
        let _second = m.connect("t2").await.unwrap();

        assert_eq!(transport.opens.load(Ordering::SeqCst), 2);
        assert_eq!(m.thread_id().as_deref(), Some("t2"));
        // First connection's task exited without a terminal event
        assert!(first.events.recv().await.is_none());
    }

    // =========================================================================
    // Send Tests
    // =========================================================================

    #[tokio::test]
    async fn test_send_not_connected() {
        let m = manager(FakeTransport::new());
        assert!(matches!(
            m.send("t1", "hi", true),
            Err(SendError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_send_wrong_thread_is_not_connected() {
        let m = manager(FakeTransport::new());
        let _c = m.connect("t1").await.unwrap();
        assert!(matches!(
            m.send("t2", "hi", true),
            Err(SendError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_send_wire_frame() {
        let transport = FakeTransport::new();
        let m = manager(transport.clone());
        let _c = m.connect("t1").await.unwrap();
        let mut peer = transport.take_peer();

        m.send("t1", "How are you?", true).unwrap();
        let raw = peer.from_client.next().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"message": "How are you?", "thread_id": "t1", "is_first_message": false})
        );

        m.send("t1", "first", false).unwrap();
        let raw = peer.from_client.next().await.unwrap();
        assert!(raw.contains(r#""is_first_message":true"#));
    }

    // =========================================================================
    // Event Tests
    // =========================================================================

    #[tokio::test]
    async fn test_chunks_then_complete() {
        let transport = FakeTransport::new();
        let m = manager(transport.clone());
        let mut connected = m.connect("t1").await.unwrap();
        let peer = transport.take_peer();

        peer.push(r#"{"type":"chunk","content":"I'm"}"#);
        peer.push(r#"{"type":"chunk","content":" good"}"#);
        peer.push(r#"{"type":"complete"}"#);

        assert_eq!(connected.events.recv().await, Some(StreamEvent::Chunk("I'm".into())));
        assert_eq!(connected.events.recv().await, Some(StreamEvent::Chunk(" good".into())));
        assert_eq!(connected.events.recv().await, Some(StreamEvent::Complete(None)));
        assert_eq!(connected.events.recv().await, None);

        assert_eq!(m.state(), ConnectionState::Closed);
        assert!(matches!(m.send("t1", "again", true), Err(SendError::NotConnected)));
    }

    #[tokio::test]
    async fn test_decode_failure_is_terminal() {
        let transport = FakeTransport::new();
        let m = manager(transport.clone());
        let mut connected = m.connect("t1").await.unwrap();
        let peer = transport.take_peer();

        peer.push(r#"{"type":"chunk","content":"a"}"#);
        peer.push("garbage");
        peer.push(r#"{"type":"chunk","content":"b"}"#);

        assert_eq!(connected.events.recv().await, Some(StreamEvent::Chunk("a".into())));
        assert_eq!(
            connected.events.recv().await,
            Some(StreamEvent::Error(DECODE_FAILURE.into()))
        );
        assert_eq!(connected.events.recv().await, None);
        assert_eq!(m.state(), ConnectionState::Errored);
    }

    #[tokio::test]
    async fn test_binary_frame_is_decode_failure() {
        let transport = FakeTransport::new();
        let m = manager(transport.clone());
        let mut connected = m.connect("t1").await.unwrap();
        let peer = transport.take_peer();

        peer.to_client
            .unbounded_send(Ok(InboundFrame::Binary(vec![1, 2, 3])))
            .unwrap();
        assert_eq!(
            connected.events.recv().await,
            Some(StreamEvent::Error(DECODE_FAILURE.into()))
        );
    }

    #[tokio::test]
    async fn test_server_close_is_error() {
        let transport = FakeTransport::new();
        let m = manager(transport.clone());
        let mut connected = m.connect("t1").await.unwrap();
        drop(transport.take_peer());

        assert_eq!(
            connected.events.recv().await,
            Some(StreamEvent::Error("Connection closed".into()))
        );
        assert_eq!(connected.events.recv().await, None);
        assert!(!m.is_connected());
    }

    // =========================================================================
    // Disconnect Tests
    // =========================================================================

    #[tokio::test]
    async fn test_disconnect_when_idle_is_noop() {
        let m = manager(FakeTransport::new());
        m.disconnect().await;
        m.disconnect().await;
        assert_eq!(m.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_disconnect_closes_and_stops_events() {
        let transport = FakeTransport::new();
        let m = manager(transport.clone());
        let mut connected = m.connect("t1").await.unwrap();
        let mut peer = transport.take_peer();

        m.disconnect().await;
        assert_eq!(m.state(), ConnectionState::Closed);
        assert!(connected.events.recv().await.is_none());
        // Client side of the link was closed
        assert!(peer.from_client.next().await.is_none());

        m.disconnect().await;
        assert_eq!(m.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_during_connect() {
        let m = manager(Arc::new(HangingTransport));
        let m2 = m.clone();
        let pending = tokio::spawn(async move { m2.connect("t1").await });
        tokio::task::yield_now().await;

        m.disconnect().await;
        assert_eq!(m.state(), ConnectionState::Closed);

        // The pending attempt can no longer flip the state
        let _ = pending.await.unwrap();
        assert_eq!(m.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_connect_error_display() {
        assert_eq!(
            ConnectError::AlreadyConnecting.to_string(),
            "Another connection attempt is already in progress"
        );
        assert_eq!(SendError::NotConnected.to_string(), "Not connected");
        assert_eq!(ConnectionState::Open.to_string(), "open");
    }
}
