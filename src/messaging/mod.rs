//! Event plumbing between a chat session and its observers.
//!
//! ```text
//!     ┌──────────────────────────────┐
//!     │          ChatSession         │
//!     │ (StreamEvent → store → bus)  │
//!     └──────────────┬───────────────┘
//!                    │ EventBridge
//!              ┌─────┴──────┐
//!              │  EventBus  │
//!              └─────┬──────┘
//!                    │ broadcast
//!           ┌────────┴────────┐
//!           ▼                 ▼
//!     ┌──────────┐      ┌──────────┐
//!     │ Terminal │      │  Bridge  │
//!     │ Renderer │      │ (NDJSON) │
//!     └──────────┘      └──────────┘
//! ```
//!
//! - [`ChatEvent`]: UI-agnostic events (turns, deltas, connection, health)
//! - [`EventBus`]: broadcast channel for pub/sub
//! - [`EventBridge`]: applies stream events to the store and publishes them
//! - [`TerminalRenderer`]: renders events with colors

mod bus;
mod event_bridge;
mod renderer;
mod types;

pub use bus::{BusError, EventBus, EventReceiver, EventSender};
pub use event_bridge::{Applied, EventBridge};
pub use renderer::{RenderStyle, TerminalRenderer};
pub use types::*;
