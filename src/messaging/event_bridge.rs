//! Bridge between decoded stream events, the message store and the bus.
//!
//! Every change the session makes to its conversation goes through here so
//! that observers on the bus see exactly what the store saw, in order.

use serde_json::Value;
use tracing::debug;

use super::{ChatEvent, EventSender};
use crate::connection::StreamEvent;
use crate::store::MessageStore;

/// What applying one stream event did to the conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// Text appended to the active turn.
    Chunk,
    /// The active turn finished. `None` when no chunk ever arrived.
    Completed(Option<String>),
    /// The stream ended with an error, now shown on an assistant turn.
    Failed(String),
}

impl Applied {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Applied::Chunk)
    }
}

/// Applies stream events to a [`MessageStore`] and publishes the result.
#[derive(Clone)]
pub struct EventBridge {
    sender: EventSender,
}

impl EventBridge {
    pub fn new(sender: EventSender) -> Self {
        Self { sender }
    }

    pub fn sender(&self) -> &EventSender {
        &self.sender
    }

    /// Process one stream event.
    pub fn apply(&self, store: &mut MessageStore, event: StreamEvent) -> Applied {
        match event {
            StreamEvent::Chunk(text) => {
                store.push_chunk(&text);
                self.sender.emit(ChatEvent::text_delta(&text));
                Applied::Chunk
            }
            StreamEvent::Complete(context) => self.complete(store, context),
            StreamEvent::Error(reason) => {
                debug!(%reason, "Stream ended with error");
                store.fail_active(reason.clone());
                self.sender.emit(ChatEvent::turn_failed(&reason));
                Applied::Failed(reason)
            }
        }
    }

    fn complete(&self, store: &mut MessageStore, context: Option<Value>) -> Applied {
        match store.finish_active() {
            Some(turn) => {
                self.sender
                    .emit(ChatEvent::turn_completed(&turn.id, &turn.content, context));
                Applied::Completed(Some(turn.id))
            }
            None => {
                debug!("Stream completed without any chunks");
                Applied::Completed(None)
            }
        }
    }

    /// Append the user's turn.
    pub fn user_turn(&self, store: &mut MessageStore, text: &str) -> String {
        let id = store.append_user(text);
        self.sender.emit(ChatEvent::user_message(&id, text));
        id
    }

    /// Append a complete assistant reply (one-shot path).
    pub fn assistant_turn(&self, store: &mut MessageStore, text: &str) -> String {
        let id = store.append_assistant(text);
        self.sender.emit(ChatEvent::assistant_message(&id, text));
        id
    }

    /// Seal the streaming turn, if any, as cancelled.
    pub fn cancel(&self, store: &mut MessageStore) -> bool {
        let cancelled = store.cancel_active();
        if cancelled {
            self.sender.emit(ChatEvent::turn_cancelled());
        }
        cancelled
    }

    pub fn clear(&self, store: &mut MessageStore) {
        store.clear();
        self.sender.emit(ChatEvent::Clear);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::DECODE_FAILURE;
    use crate::messaging::{EventBus, TurnEvent};
    use crate::store::MessageStatus;
    use serde_json::json;

    fn setup() -> (EventBus, EventBridge, MessageStore) {
        let bus = EventBus::new();
        let bridge = EventBridge::new(bus.sender());
        (bus, bridge, MessageStore::new())
    }

    // =========================================================================
    // Streaming
    // =========================================================================

    #[test]
    fn test_chunks_then_complete() {
        let (bus, bridge, mut store) = setup();
        let mut rx = bus.subscribe();

        assert_eq!(bridge.apply(&mut store, StreamEvent::Chunk("I'm".into())), Applied::Chunk);
        bridge.apply(&mut store, StreamEvent::Chunk(" good".into()));
        let done = bridge.apply(&mut store, StreamEvent::Complete(Some(json!({"scope": "x"}))));

        assert!(done.is_terminal());
        assert_eq!(store.len(), 1);
        assert_eq!(store.messages()[0].content, "I'm good");
        assert_eq!(store.messages()[0].status, MessageStatus::Complete);
        assert!(!store.is_streaming());

        let events = rx.drain();
        assert_eq!(events.len(), 3);
        match &events[2] {
            ChatEvent::Turn(TurnEvent::Completed { content, context, .. }) => {
                assert_eq!(content, "I'm good");
                assert_eq!(context.as_ref().unwrap()["scope"], "x");
            }
            other => panic!("Expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_complete_without_chunks_creates_nothing() {
        let (_bus, bridge, mut store) = setup();
        assert_eq!(
            bridge.apply(&mut store, StreamEvent::Complete(None)),
            Applied::Completed(None)
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_error_keeps_partial_content() {
        let (_bus, bridge, mut store) = setup();
        bridge.apply(&mut store, StreamEvent::Chunk("par".into()));
        let result = bridge.apply(&mut store, StreamEvent::Error(DECODE_FAILURE.into()));

        assert_eq!(result, Applied::Failed(DECODE_FAILURE.into()));
        assert_eq!(store.len(), 1);
        assert_eq!(store.messages()[0].content, "par");
        assert_eq!(store.messages()[0].error(), Some(DECODE_FAILURE));
    }

    #[test]
    fn test_error_without_turn_appends_failed_turn() {
        let (_bus, bridge, mut store) = setup();
        bridge.user_turn(&mut store, "hi");
        bridge.apply(&mut store, StreamEvent::Error("boom".into()));

        assert_eq!(store.len(), 2);
        assert!(store.messages()[1].is_assistant());
        assert_eq!(store.messages()[1].error(), Some("boom"));
    }

    // =========================================================================
    // Turns
    // =========================================================================

    #[test]
    fn test_user_and_assistant_turns_publish() {
        let (bus, bridge, mut store) = setup();
        let mut rx = bus.subscribe();

        let user_id = bridge.user_turn(&mut store, "Hello");
        bridge.assistant_turn(&mut store, "Hi!");

        let events = rx.drain();
        assert!(matches!(&events[0], ChatEvent::UserMessage(m) if m.id == user_id));
        assert!(matches!(&events[1], ChatEvent::AssistantMessage(m) if m.content == "Hi!"));
    }

    #[test]
    fn test_cancel_only_publishes_when_streaming() {
        let (bus, bridge, mut store) = setup();
        let mut rx = bus.subscribe();

        assert!(!bridge.cancel(&mut store));
        bridge.apply(&mut store, StreamEvent::Chunk("x".into()));
        assert!(bridge.cancel(&mut store));

        let events = rx.drain();
        assert!(matches!(events.last(), Some(ChatEvent::Turn(TurnEvent::Cancelled))));
        assert_eq!(store.messages()[0].status, MessageStatus::Cancelled);
    }

    #[test]
    fn test_clear() {
        let (bus, bridge, mut store) = setup();
        let mut rx = bus.subscribe();
        bridge.user_turn(&mut store, "a");
        bridge.clear(&mut store);

        assert!(store.is_empty());
        assert!(matches!(rx.drain().last(), Some(ChatEvent::Clear)));
    }
}
