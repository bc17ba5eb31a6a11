//! Event types published by a chat session.

use serde::{Deserialize, Serialize};

use crate::backend::HealthStatus;
use crate::connection::ConnectionState;

/// Message levels for styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Success,
    Warning,
    Error,
    Debug,
}

/// A text notice (status line, error banner).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextMessage {
    pub level: MessageLevel,
    pub text: String,
}

/// A turn appended to the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnMessage {
    pub id: String,
    pub content: String,
}

/// Streaming text for the active assistant turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextDeltaMessage {
    pub text: String,
}

/// Assistant turn lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum TurnEvent {
    Completed {
        id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<serde_json::Value>,
    },
    Failed {
        reason: String,
    },
    Cancelled,
}

/// Anything a UI may want to observe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Text(TextMessage),
    UserMessage(TurnMessage),
    /// A complete assistant reply from a one-shot request.
    AssistantMessage(TurnMessage),
    TextDelta(TextDeltaMessage),
    Turn(TurnEvent),
    ThreadAssigned { thread_id: String },
    Connection { state: ConnectionState },
    Health { status: HealthStatus },
    Clear,
}

impl ChatEvent {
    /// Create an info message.
    pub fn info(text: impl Into<String>) -> Self {
        Self::Text(TextMessage {
            level: MessageLevel::Info,
            text: text.into(),
        })
    }

    /// Create a success message.
    pub fn success(text: impl Into<String>) -> Self {
        Self::Text(TextMessage {
            level: MessageLevel::Success,
            text: text.into(),
        })
    }

    /// Create a warning message.
    pub fn warning(text: impl Into<String>) -> Self {
        Self::Text(TextMessage {
            level: MessageLevel::Warning,
            text: text.into(),
        })
    }

    /// Create an error message.
    pub fn error(text: impl Into<String>) -> Self {
        Self::Text(TextMessage {
            level: MessageLevel::Error,
            text: text.into(),
        })
    }

    pub fn user_message(id: &str, content: &str) -> Self {
        Self::UserMessage(TurnMessage {
            id: id.to_string(),
            content: content.to_string(),
        })
    }

    pub fn assistant_message(id: &str, content: &str) -> Self {
        Self::AssistantMessage(TurnMessage {
            id: id.to_string(),
            content: content.to_string(),
        })
    }

    /// Create a text delta message.
    pub fn text_delta(text: &str) -> Self {
        Self::TextDelta(TextDeltaMessage {
            text: text.to_string(),
        })
    }

    pub fn turn_completed(id: &str, content: &str, context: Option<serde_json::Value>) -> Self {
        Self::Turn(TurnEvent::Completed {
            id: id.to_string(),
            content: content.to_string(),
            context,
        })
    }

    pub fn turn_failed(reason: &str) -> Self {
        Self::Turn(TurnEvent::Failed {
            reason: reason.to_string(),
        })
    }

    pub fn turn_cancelled() -> Self {
        Self::Turn(TurnEvent::Cancelled)
    }

    pub fn thread_assigned(thread_id: &str) -> Self {
        Self::ThreadAssigned {
            thread_id: thread_id.to_string(),
        }
    }

    pub fn connection(state: ConnectionState) -> Self {
        Self::Connection { state }
    }

    pub fn health(status: HealthStatus) -> Self {
        Self::Health { status }
    }
}
