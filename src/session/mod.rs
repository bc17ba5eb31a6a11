//! Chat sessions.
//!
//! A [`ChatSession`] owns one conversation: its message store, its thread
//! id, the streaming connection bound to that thread and the HTTP backend
//! used to bootstrap the thread and as a fallback.
//!
//! ## Usage
//!
//! ```ignore
//! use chatrelay::{ChatSession, ClientConfig};
//!
//! let session = ChatSession::from_config(&ClientConfig::load()?)?;
//! session.init().await;
//!
//! session.submit("Hello").await?;        // HTTP, issues the thread id
//! session.submit("How are you?").await?; // streamed token by token
//!
//! session.shutdown().await;
//! ```

mod chat;

use thiserror::Error;

use crate::backend::BackendError;
use crate::config::ConfigError;

pub use chat::ChatSession;

/// Errors a submission can surface to the caller.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Message is empty")]
    EmptyMessage,
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// How a submission was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Another submission is still pending; nothing was done.
    Busy,
    /// First exchange of a conversation; the backend issued `thread_id`.
    Bootstrapped { thread_id: String },
    /// Reply streamed over the open connection.
    Streamed,
    /// The stream ended with an error, shown inline on the assistant turn.
    StreamFailed { reason: String },
    /// Reply fetched with a one-shot HTTP request on an existing thread.
    OneShot,
    /// `stop()` interrupted the submission.
    Cancelled,
}

impl SubmitOutcome {
    /// Whether the submission produced a full reply.
    pub fn is_reply(&self) -> bool {
        matches!(
            self,
            SubmitOutcome::Bootstrapped { .. } | SubmitOutcome::Streamed | SubmitOutcome::OneShot
        )
    }
}
