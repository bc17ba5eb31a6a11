//! In-memory conversation state

mod conversation;
mod message;

pub use conversation::{MessageStore, TurnState};
pub use message::{ChatMessage, MessageRole, MessageStatus};
