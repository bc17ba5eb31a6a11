//! Conversation state management
//!
//! Ordered list of turns plus the explicit state of the assistant turn that
//! is currently receiving chunks.
//!
//! Every mutation swaps in a freshly built `Arc<[ChatMessage]>`. Observers
//! that hold on to a [`MessageStore::snapshot`] can detect change with
//! `Arc::ptr_eq` and never see a half-applied update.

use std::sync::Arc;

use tracing::warn;

use super::message::{ChatMessage, MessageRole, MessageStatus};

/// Which assistant turn, if any, is being streamed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Idle,
    Active { index: usize },
}

/// Ordered conversation turns.
#[derive(Debug, Clone)]
pub struct MessageStore {
    messages: Arc<[ChatMessage]>,
    turn: TurnState,
    revision: u64,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore {
    pub fn new() -> Self {
        Self {
            messages: Arc::from(Vec::new()),
            turn: TurnState::Idle,
            revision: 0,
        }
    }

    /// Current contents. Cheap; shares the underlying allocation.
    pub fn snapshot(&self) -> Arc<[ChatMessage]> {
        Arc::clone(&self.messages)
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Bumped on every mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn turn(&self) -> TurnState {
        self.turn
    }

    /// The assistant turn receiving chunks, if any.
    pub fn active_turn(&self) -> Option<&ChatMessage> {
        match self.turn {
            TurnState::Active { index } => self.messages.get(index),
            TurnState::Idle => None,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.active_turn().is_some()
    }

    /// Rebuild the sequence with `f` applied, then publish it.
    fn replace_with(&mut self, f: impl FnOnce(&mut Vec<ChatMessage>, &mut TurnState)) {
        let mut next = self.messages.to_vec();
        f(&mut next, &mut self.turn);
        self.messages = Arc::from(next);
        self.revision += 1;
    }

    /// Close the active turn, if any, with `status`.
    fn seal(messages: &mut [ChatMessage], turn: &mut TurnState, status: MessageStatus) {
        if let TurnState::Active { index } = *turn {
            if let Some(msg) = messages.get_mut(index) {
                msg.status = status;
            }
            *turn = TurnState::Idle;
        }
    }

    fn push_turn(&mut self, message: ChatMessage) -> String {
        let id = message.id.clone();
        self.replace_with(|messages, turn| {
            if let TurnState::Active { .. } = turn {
                warn!("New turn appended while a reply was still streaming");
            }
            Self::seal(messages, turn, MessageStatus::Cancelled);
            messages.push(message);
        });
        id
    }

    /// Append a user turn. Any reply still streaming is sealed as cancelled.
    pub fn append_user(&mut self, text: impl Into<String>) -> String {
        self.push_turn(ChatMessage::user(text))
    }

    /// Append a finished assistant turn.
    pub fn append_assistant(&mut self, text: impl Into<String>) -> String {
        self.push_turn(ChatMessage::assistant(text))
    }

    /// Apply `updater` to the active assistant turn.
    ///
    /// With no active turn a new streaming one is started, seeded with
    /// `updater("")`. Returns the index of the updated turn.
    pub fn update_last_assistant(&mut self, updater: impl FnOnce(&str) -> String) -> usize {
        let mut updated = 0;
        self.replace_with(|messages, turn| match *turn {
            TurnState::Active { index } => {
                let msg = &mut messages[index];
                msg.content = updater(&msg.content);
                updated = index;
            }
            TurnState::Idle => {
                messages.push(ChatMessage::streaming(updater("")));
                updated = messages.len() - 1;
                *turn = TurnState::Active { index: updated };
            }
        });
        updated
    }

    /// Append a chunk to the active turn (starting one if needed).
    pub fn push_chunk(&mut self, chunk: &str) -> usize {
        self.update_last_assistant(|current| {
            let mut next = String::with_capacity(current.len() + chunk.len());
            next.push_str(current);
            next.push_str(chunk);
            next
        })
    }

    /// Mark the active turn complete. `None` when nothing was streaming.
    pub fn finish_active(&mut self) -> Option<ChatMessage> {
        let TurnState::Active { index } = self.turn else {
            return None;
        };
        self.replace_with(|messages, turn| Self::seal(messages, turn, MessageStatus::Complete));
        self.messages.get(index).cloned()
    }

    /// Mark the active turn failed, keeping its partial content.
    ///
    /// With nothing streaming an empty failed assistant turn is appended so
    /// the error still shows up inline.
    pub fn fail_active(&mut self, reason: impl Into<String>) -> ChatMessage {
        let reason = reason.into();
        let mut index = 0;
        self.replace_with(|messages, turn| match *turn {
            TurnState::Active { index: active } => {
                index = active;
                Self::seal(messages, turn, MessageStatus::Failed(reason));
            }
            TurnState::Idle => {
                let mut msg = ChatMessage::assistant(String::new());
                msg.status = MessageStatus::Failed(reason);
                messages.push(msg);
                index = messages.len() - 1;
            }
        });
        self.messages[index].clone()
    }

    /// Mark the active turn cancelled. Returns whether one was active.
    pub fn cancel_active(&mut self) -> bool {
        if self.turn == TurnState::Idle {
            return false;
        }
        self.replace_with(|messages, turn| Self::seal(messages, turn, MessageStatus::Cancelled));
        true
    }

    /// Replace the whole conversation. Turns still marked streaming are
    /// treated as cancelled; nothing is active afterwards.
    pub fn replace_all(&mut self, messages: Vec<ChatMessage>) {
        self.replace_with(|current, turn| {
            *current = messages;
            for msg in current.iter_mut().filter(|m| m.is_streaming()) {
                msg.status = MessageStatus::Cancelled;
            }
            *turn = TurnState::Idle;
        });
    }

    /// Reset to an empty conversation.
    pub fn clear(&mut self) {
        self.replace_with(|messages, turn| {
            messages.clear();
            *turn = TurnState::Idle;
        });
    }

    /// Count of turns per role.
    pub fn count(&self, role: MessageRole) -> usize {
        self.messages.iter().filter(|m| m.role == role).count()
    }
}
