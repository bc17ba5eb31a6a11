//! Chat message types
//!
//! Defines the single turn of a conversation as the store keeps it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Lifecycle of a message's content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum MessageStatus {
    /// Final content; never changes again.
    Complete,
    /// Assistant turn still receiving chunks.
    Streaming,
    /// Stream ended with an error. Content holds whatever arrived first.
    Failed(String),
    /// Stream was stopped by the user or superseded.
    Cancelled,
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
}

impl ChatMessage {
    fn new(role: MessageRole, content: String, status: MessageStatus) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content,
            timestamp: Utc::now(),
            status,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content.into(), MessageStatus::Complete)
    }

    /// A finished assistant reply (one-shot responses).
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content.into(), MessageStatus::Complete)
    }

    /// An assistant reply that will keep receiving chunks.
    pub fn streaming(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content.into(), MessageStatus::Streaming)
    }

    pub fn is_user(&self) -> bool {
        self.role == MessageRole::User
    }

    pub fn is_assistant(&self) -> bool {
        self.role == MessageRole::Assistant
    }

    pub fn is_streaming(&self) -> bool {
        self.status == MessageStatus::Streaming
    }

    /// Error text for a failed turn.
    pub fn error(&self) -> Option<&str> {
        match &self.status {
            MessageStatus::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}
