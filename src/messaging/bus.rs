//! Broadcast bus carrying session events to any number of observers.

use super::ChatEvent;
use tokio::sync::broadcast;

/// Capacity of the broadcast ring. Slow observers past this see `Lagged`.
const BUS_CAPACITY: usize = 1024;

/// Publishing half of the bus.
#[derive(Clone)]
pub struct EventSender {
    tx: broadcast::Sender<ChatEvent>,
}

impl EventSender {
    /// Publish an event. Fails only when nobody is subscribed.
    pub fn send(&self, event: ChatEvent) -> Result<(), BusError> {
        self.tx.send(event).map_err(|_| BusError::Closed)?;
        Ok(())
    }

    /// Publish, ignoring the no-subscriber case.
    pub fn emit(&self, event: ChatEvent) {
        let _ = self.send(event);
    }

    /// Publish an error notice.
    pub fn error(&self, text: impl Into<String>) {
        self.emit(ChatEvent::error(text));
    }
}

/// Subscribing half of the bus.
pub struct EventReceiver {
    rx: broadcast::Receiver<ChatEvent>,
}

impl EventReceiver {
    /// Receive the next event.
    pub async fn recv(&mut self) -> Result<ChatEvent, BusError> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => BusError::Closed,
            broadcast::error::RecvError::Lagged(n) => BusError::Lagged(n),
        })
    }

    /// Try to receive an event without waiting.
    pub fn try_recv(&mut self) -> Result<Option<ChatEvent>, BusError> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(BusError::Closed),
            Err(broadcast::error::TryRecvError::Lagged(n)) => Err(BusError::Lagged(n)),
        }
    }

    /// Everything currently buffered, skipping over lag gaps.
    pub fn drain(&mut self) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        loop {
            match self.try_recv() {
                Ok(Some(event)) => events.push(event),
                Err(BusError::Lagged(_)) => continue,
                Ok(None) | Err(BusError::Closed) => break,
            }
        }
        events
    }
}

/// Event bus owned by a chat session.
pub struct EventBus {
    tx: broadcast::Sender<ChatEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    pub fn sender(&self) -> EventSender {
        EventSender {
            tx: self.tx.clone(),
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Bus errors.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Channel closed")]
    Closed,
    #[error("Lagged behind by {0} events")]
    Lagged(u64),
}
