//! CLI components.

pub mod bridge;
pub mod prompt;
pub mod repl;
pub mod runner;

pub use bridge::{run_bridge_mode, BridgeInCommand, BridgeOutMessage};
pub use prompt::{create_reedline, CommandCompleter, RelayPrompt, COMMANDS};
pub use repl::Repl;
pub use runner::{run_interactive, run_single_prompt};
