//! Chatrelay Library
//!
//! Client side of a chat relay: one-shot HTTP requests that start a
//! conversation, then a streaming connection that delivers replies chunk
//! by chunk, with HTTP as the fallback whenever streaming is unavailable.
//!
//! ## Main Components
//!
//! - [`connection`] - Streaming connection lifecycle and frame decoding
//! - [`store`] - Ordered conversation state
//! - [`session`] - Submission orchestration (bootstrap, stream, fallback)
//! - [`backend`] - HTTP endpoints: chat, health, thread reset
//! - [`messaging`] - Event bus and terminal rendering
//! - [`config`] - Configuration and XDG paths
//! - [`cli`] - REPL, single-prompt and bridge modes
//!
//! ## Quick Start
//!
//! ```ignore
//! use chatrelay::{ChatSession, ClientConfig};
//!
//! let config = ClientConfig::load()?;
//! let session = ChatSession::from_config(&config)?;
//! session.init().await;
//! session.submit("Hello").await?;
//! ```

pub mod backend;
pub mod cli;
pub mod config;
pub mod connection;
pub mod messaging;
pub mod protocol;
pub mod session;
pub mod store;

// Re-export commonly used types
pub use backend::{BackendError, ChatBackend, HealthStatus, HttpBackend};
pub use config::{ClientConfig, ConfigError, TransportMode, XdgDirs};
pub use connection::{
    ConnectionManager, ConnectionState, StreamEvent, StreamTransport, WebSocketTransport,
};
pub use messaging::{ChatEvent, EventBus, EventReceiver, TerminalRenderer};
pub use session::{ChatError, ChatSession, SubmitOutcome};
pub use store::{ChatMessage, MessageStatus, MessageStore};
