//! The submission orchestrator.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{ChatError, SubmitOutcome};
use crate::backend::{ChatBackend, HealthStatus, HttpBackend};
use crate::config::{ClientConfig, TransportMode};
use crate::connection::{
    ConnectionEvents, ConnectionManager, ConnectionState, StreamEvent, TransportError,
    WebSocketTransport,
};
use crate::messaging::{Applied, ChatEvent, EventBridge, EventBus, EventReceiver};
use crate::protocol::ChatRequest;
use crate::store::{ChatMessage, MessageStore};

#[derive(Default)]
struct Inner {
    thread_id: Option<String>,
    /// Events of the open connection, held between turns.
    events: Option<ConnectionEvents>,
    /// Background connect started after the last reply.
    reconnect: Option<JoinHandle<()>>,
    error: Option<String>,
    health: HealthStatus,
}

fn lock_inner(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Clears the busy flag when a submission ends, however it ends.
struct BusyGuard<'a>(&'a watch::Sender<bool>);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

/// One conversation with the chat backend.
///
/// All methods take `&self`; share it behind an `Arc` to drive it from
/// several tasks. Only one submission is in flight at a time.
pub struct ChatSession {
    mode: TransportMode,
    clear_remote_on_reset: bool,
    backend: Arc<dyn ChatBackend>,
    connection: ConnectionManager,
    store: Mutex<MessageStore>,
    inner: Arc<Mutex<Inner>>,
    /// `true` while a submission is in flight.
    busy: watch::Sender<bool>,
    /// Bumped by `stop()`. In-flight work gives up when it changes.
    cancel: watch::Sender<u64>,
    bus: EventBus,
    bridge: EventBridge,
}

impl ChatSession {
    pub fn new(
        config: &ClientConfig,
        backend: Arc<dyn ChatBackend>,
        connection: ConnectionManager,
    ) -> Self {
        let bus = EventBus::new();
        let bridge = EventBridge::new(bus.sender());
        let (busy, _) = watch::channel(false);
        let (cancel, _) = watch::channel(0);
        Self {
            mode: config.transport,
            clear_remote_on_reset: config.clear_remote_on_reset,
            backend,
            connection,
            store: Mutex::new(MessageStore::new()),
            inner: Arc::new(Mutex::new(Inner::default())),
            busy,
            cancel,
            bus,
            bridge,
        }
    }

    /// Session over HTTP and WebSocket endpoints taken from `config`.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ChatError> {
        config.validate()?;
        let backend = HttpBackend::new(config.http_url()?, config.request_timeout())?;
        let connection = ConnectionManager::new(
            Arc::new(WebSocketTransport::new()),
            config.stream_url()?,
            config.connect_timeout(),
        );
        Ok(Self::new(config, Arc::new(backend), connection))
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        lock_inner(&self.inner)
    }

    fn with_store<R>(&self, f: impl FnOnce(&mut MessageStore) -> R) -> R {
        let mut store = self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut store)
    }

    // =========================================================================
    // Observers
    // =========================================================================

    /// Subscribe to everything this session publishes.
    pub fn subscribe(&self) -> EventReceiver {
        self.bus.subscribe()
    }

    /// Snapshot of the conversation.
    pub fn messages(&self) -> Arc<[ChatMessage]> {
        self.with_store(|store| store.snapshot())
    }

    /// A submission is in flight.
    pub fn is_loading(&self) -> bool {
        *self.busy.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn thread_id(&self) -> Option<String> {
        self.lock_inner().thread_id.clone()
    }

    /// Error banner: the last bootstrap, fallback or health failure.
    pub fn error(&self) -> Option<String> {
        self.lock_inner().error.clone()
    }

    pub fn health(&self) -> HealthStatus {
        self.lock_inner().health
    }

    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    /// Wait for the background reconnect after the last reply, then report
    /// whether the next message will stream.
    pub async fn stream_ready(&self) -> bool {
        self.settle_reconnect().await;
        self.is_connected()
    }

    fn set_error(&self, message: String) {
        self.lock_inner().error = Some(message.clone());
        self.bus.sender().error(message);
    }

    fn publish_connection(&self) {
        self.bus
            .sender()
            .emit(ChatEvent::connection(self.connection.state()));
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Check backend health. Failure only sets the error banner.
    pub async fn init(&self) -> HealthStatus {
        let status = match self.backend.health().await {
            Ok(status) => {
                info!(%status, "Backend health");
                if status == HealthStatus::Unreachable {
                    self.set_error("Backend reports it is not connected".to_string());
                }
                status
            }
            Err(e) => {
                warn!("Health check failed: {}", e);
                self.set_error(e.to_string());
                HealthStatus::Unreachable
            }
        };
        self.lock_inner().health = status;
        self.bus.sender().emit(ChatEvent::health(status));
        status
    }

    /// Close the streaming connection. The conversation is kept.
    pub async fn shutdown(&self) {
        self.abort_reconnect().await;
        self.lock_inner().events = None;
        self.connection.disconnect().await;
        self.publish_connection();
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Send `text` and wait for the reply to land in the store.
    ///
    /// [`stop`] from another task makes this return
    /// [`SubmitOutcome::Cancelled`] without applying anything further.
    /// Dropping the returned future abandons the reply; call [`stop`]
    /// afterwards to seal a partial turn and close the connection.
    ///
    /// [`stop`]: ChatSession::stop
    pub async fn submit(&self, text: &str) -> Result<SubmitOutcome, ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let mut cancelled = self.cancel.subscribe();
        if !self
            .busy
            .send_if_modified(|busy| !std::mem::replace(busy, true))
        {
            debug!("Submission rejected, another one is pending");
            return Ok(SubmitOutcome::Busy);
        }
        let _busy = BusyGuard(&self.busy);
        self.lock_inner().error = None;

        tokio::select! {
            biased;
            _ = cancelled.changed() => {
                debug!("Submission cancelled");
                Ok(SubmitOutcome::Cancelled)
            }
            result = self.dispatch(text) => result,
        }
    }

    async fn dispatch(&self, text: &str) -> Result<SubmitOutcome, ChatError> {
        self.with_store(|store| self.bridge.user_turn(store, text));

        let Some(thread_id) = self.thread_id() else {
            return self.one_shot(text, None).await;
        };

        if self.mode == TransportMode::Streaming {
            self.settle_reconnect().await;
            match self.take_events(&thread_id) {
                Some(events) => match self.connection.send(&thread_id, text, true) {
                    Ok(()) => return Ok(self.stream_reply(&thread_id, events).await),
                    Err(e) => warn!("Streaming send failed, falling back to HTTP: {}", e),
                },
                None => debug!("No open connection for thread {}, using HTTP", thread_id),
            }
        }

        self.one_shot(text, Some(thread_id)).await
    }

    /// Events of the connection, if it is open for `thread_id`.
    fn take_events(&self, thread_id: &str) -> Option<ConnectionEvents> {
        if self.connection.thread_id().as_deref() != Some(thread_id) {
            return None;
        }
        let mut events = self.lock_inner().events.take()?;
        let stale = events.discard_pending();
        if stale > 0 {
            warn!(stale, "Discarded events received between turns");
        }
        Some(events)
    }

    async fn stream_reply(&self, thread_id: &str, mut events: ConnectionEvents) -> SubmitOutcome {
        let outcome = loop {
            let event = events
                .recv()
                .await
                .unwrap_or_else(|| StreamEvent::Error(TransportError::Closed.to_string()));
            match self.with_store(|store| self.bridge.apply(store, event)) {
                Applied::Chunk => continue,
                Applied::Completed(_) => break SubmitOutcome::Streamed,
                Applied::Failed(reason) => break SubmitOutcome::StreamFailed { reason },
            }
        };

        // The terminal event closed the connection; reopen it for the next turn.
        self.spawn_reconnect(thread_id);
        outcome
    }

    /// One HTTP exchange. `thread_id` is `None` for the first message.
    async fn one_shot(
        &self,
        text: &str,
        thread_id: Option<String>,
    ) -> Result<SubmitOutcome, ChatError> {
        let request = ChatRequest {
            message: text.to_string(),
            thread_id: thread_id.clone(),
        };
        let response = match self.backend.send_message(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Chat request failed: {}", e);
                self.set_error(e.to_string());
                return Err(e.into());
            }
        };

        self.with_store(|store| self.bridge.assistant_turn(store, &response.response));

        let issued = response.thread_id;
        if thread_id.as_deref() != Some(issued.as_str()) {
            if let Some(old) = &thread_id {
                warn!("Backend moved the conversation from thread {} to {}", old, issued);
                self.lock_inner().events = None;
                self.connection.disconnect().await;
            } else {
                info!("Backend issued thread {}", issued);
            }
            self.lock_inner().thread_id = Some(issued.clone());
            self.bus.sender().emit(ChatEvent::thread_assigned(&issued));
        }

        if self.connection.thread_id().as_deref() != Some(issued.as_str()) {
            self.spawn_reconnect(&issued);
        }

        Ok(match thread_id {
            None => SubmitOutcome::Bootstrapped { thread_id: issued },
            Some(_) => SubmitOutcome::OneShot,
        })
    }

    // =========================================================================
    // Reconnect
    // =========================================================================

    /// Open the streaming connection for `thread_id` without holding up the
    /// submission. `stop()` abandons it.
    fn spawn_reconnect(&self, thread_id: &str) {
        if self.mode != TransportMode::Streaming {
            return;
        }
        let connection = self.connection.clone();
        let inner = Arc::clone(&self.inner);
        let sender = self.bus.sender();
        let thread_id = thread_id.to_string();
        let mut cancelled = self.cancel.subscribe();

        let mut state = self.lock_inner();
        let previous = state.reconnect.take();
        state.reconnect = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                previous.abort();
                let _ = previous.await;
            }
            tokio::select! {
                _ = open_stream(&connection, &inner, &thread_id) => {}
                _ = cancelled.changed() => debug!("Reconnect to thread {} abandoned", thread_id),
            }
            sender.emit(ChatEvent::connection(connection.state()));
        }));
    }

    /// Wait for a pending reconnect to finish.
    async fn settle_reconnect(&self) {
        let task = self.lock_inner().reconnect.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("Reconnect task failed: {}", e);
                }
            }
        }
    }

    async fn abort_reconnect(&self) {
        let task = self.lock_inner().reconnect.take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
    }

    // =========================================================================
    // Interruption
    // =========================================================================

    /// Signal in-flight work to give up and wait until no submission is
    /// running.
    async fn cancel_in_flight(&self) {
        self.cancel
            .send_modify(|generation| *generation = generation.wrapping_add(1));
        let mut busy = self.busy.subscribe();
        let _ = busy.wait_for(|busy| !*busy).await;
    }

    /// Stop the pending submission.
    ///
    /// The running `submit` returns without applying anything more. The
    /// streaming connection is closed and a partially streamed reply is
    /// sealed as cancelled. Returns whether anything was pending.
    pub async fn stop(&self) -> bool {
        let was_pending = self.is_loading();
        if was_pending {
            self.cancel_in_flight().await;
        }

        let cancelled = self.with_store(|store| self.bridge.cancel(store));
        if !was_pending && !cancelled {
            return false;
        }
        info!("Stopped current turn");

        self.lock_inner().events = None;
        self.connection.disconnect().await;
        self.publish_connection();
        true
    }

    /// Start over: close the connection, forget the thread and clear the
    /// conversation.
    pub async fn new_conversation(&self) {
        self.cancel_in_flight().await;
        self.abort_reconnect().await;
        let thread_id = {
            let mut inner = self.lock_inner();
            inner.events = None;
            inner.error = None;
            inner.thread_id.take()
        };

        self.connection.disconnect().await;
        self.with_store(|store| self.bridge.clear(store));
        self.publish_connection();

        if let (true, Some(thread_id)) = (self.clear_remote_on_reset, thread_id) {
            match self.backend.clear_thread(&thread_id).await {
                Ok(()) => debug!("Cleared thread {} on backend", thread_id),
                Err(e) => warn!("Failed to clear thread {} on backend: {}", thread_id, e),
            }
        }
    }
}

/// Connect for `thread_id` and park the events in `inner`. Failure is
/// logged and leaves the session on HTTP.
async fn open_stream(connection: &ConnectionManager, inner: &Mutex<Inner>, thread_id: &str) -> bool {
    lock_inner(inner).events = None;

    let opened = match connection.connect(thread_id).await {
        Ok(connected) => {
            let mut state = lock_inner(inner);
            if state.thread_id.as_deref() == Some(thread_id) {
                state.events = Some(connected.events);
                true
            } else {
                debug!("Thread changed while connecting, dropping connection");
                false
            }
        }
        Err(e) => {
            warn!("Streaming unavailable for thread {}: {}", thread_id, e);
            false
        }
    };
    if !opened && connection.thread_id().as_deref() == Some(thread_id) {
        connection.disconnect().await;
    }
    opened
}
