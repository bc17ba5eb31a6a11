//! Bridge mode for external UI communication.
//!
//! NDJSON over stdio: one JSON object per line in both directions.
//!
//! ## Protocol
//!
//! ### Outbound Messages (stdout)
//! ```json
//! {"type": "ready", "version": "0.3.2", "transport": "streaming"}
//! {"type": "user_message", "id": "...", "content": "How are you?"}
//! {"type": "text_delta", "text": "I'm"}
//! {"type": "turn_complete", "id": "...", "content": "I'm good"}
//! {"type": "turn_failed", "reason": "decode failure"}
//! {"type": "thread", "thread_id": "t1"}
//! {"type": "done", "outcome": "streamed"}
//! {"type": "error", "message": "..."}
//! ```
//!
//! ### Inbound Commands (stdin)
//! ```json
//! {"type": "prompt", "text": "..."}
//! {"type": "cancel"}
//! {"type": "new"}
//! {"type": "status"}
//! {"type": "shutdown"}
//! ```

use std::io::{BufRead, BufReader};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::debug;

use crate::backend::HealthStatus;
use crate::connection::ConnectionState;
use crate::messaging::{ChatEvent, MessageLevel, TurnEvent};
use crate::session::{ChatError, ChatSession, SubmitOutcome};

/// Outbound message types sent to the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeOutMessage {
    /// Bridge is ready to receive commands.
    Ready { version: String, transport: String },
    UserMessage { id: String, content: String },
    /// Complete reply from a one-shot request.
    Reply { id: String, content: String },
    TextDelta { text: String },
    TurnComplete {
        id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        context: Option<serde_json::Value>,
    },
    TurnFailed { reason: String },
    TurnCancelled,
    Thread { thread_id: String },
    Connection { state: ConnectionState },
    Health { status: HealthStatus },
    Cleared,
    /// A prompt finished; `outcome` says how.
    Done { outcome: String },
    Status {
        #[serde(skip_serializing_if = "Option::is_none")]
        thread_id: Option<String>,
        connection: ConnectionState,
        health: HealthStatus,
        loading: bool,
        messages: usize,
    },
    Error { message: String },
}

impl BridgeOutMessage {
    /// Convert a bus event to a bridge message.
    pub fn from_event(event: ChatEvent) -> Option<Self> {
        match event {
            ChatEvent::UserMessage(m) => Some(Self::UserMessage {
                id: m.id,
                content: m.content,
            }),
            ChatEvent::AssistantMessage(m) => Some(Self::Reply {
                id: m.id,
                content: m.content,
            }),
            ChatEvent::TextDelta(d) => Some(Self::TextDelta { text: d.text }),
            ChatEvent::Turn(TurnEvent::Completed { id, content, context }) => {
                Some(Self::TurnComplete { id, content, context })
            }
            ChatEvent::Turn(TurnEvent::Failed { reason }) => Some(Self::TurnFailed { reason }),
            ChatEvent::Turn(TurnEvent::Cancelled) => Some(Self::TurnCancelled),
            ChatEvent::ThreadAssigned { thread_id } => Some(Self::Thread { thread_id }),
            ChatEvent::Connection { state } => Some(Self::Connection { state }),
            ChatEvent::Health { status } => Some(Self::Health { status }),
            ChatEvent::Clear => Some(Self::Cleared),
            ChatEvent::Text(t) if t.level == MessageLevel::Error => {
                Some(Self::Error { message: t.text })
            }
            // Informational text is for humans
            ChatEvent::Text(_) => None,
        }
    }

    fn done(result: &Result<SubmitOutcome, ChatError>) -> Self {
        let outcome = match result {
            Ok(SubmitOutcome::Busy) => "busy",
            Ok(SubmitOutcome::Bootstrapped { .. }) => "bootstrapped",
            Ok(SubmitOutcome::Streamed) => "streamed",
            Ok(SubmitOutcome::StreamFailed { .. }) => "stream_failed",
            Ok(SubmitOutcome::OneShot) => "one_shot",
            Ok(SubmitOutcome::Cancelled) => "cancelled",
            Err(_) => "failed",
        };
        Self::Done {
            outcome: outcome.to_string(),
        }
    }
}

/// Inbound command types from the UI.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeInCommand {
    /// Send a message.
    Prompt { text: String },
    /// Stop the current turn.
    Cancel,
    /// Start a new conversation.
    New,
    /// Report session status.
    Status,
    /// Shutdown the bridge.
    Shutdown,
}

type Turn = JoinHandle<Result<SubmitOutcome, ChatError>>;

fn emit(msg: &BridgeOutMessage) {
    if let Ok(json) = serde_json::to_string(msg) {
        println!("{}", json);
    }
}

async fn wait_turn(current: &mut Option<Turn>) -> Result<Result<SubmitOutcome, ChatError>, JoinError> {
    match current.as_mut() {
        Some(turn) => turn.await,
        None => std::future::pending().await,
    }
}

/// Run bridge mode until stdin closes or a shutdown command arrives.
pub async fn run_bridge_mode(session: Arc<ChatSession>) -> anyhow::Result<()> {
    let mut events = session.subscribe();

    emit(&BridgeOutMessage::Ready {
        version: env!("CARGO_PKG_VERSION").to_string(),
        transport: session.mode().to_string(),
    });
    session.init().await;

    let (tx, mut rx) = mpsc::channel::<BridgeInCommand>(32);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let reader = BufReader::new(stdin.lock());

        for line in reader.lines() {
            match line {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => match serde_json::from_str::<BridgeInCommand>(&line) {
                    Ok(cmd) => {
                        if tx.blocking_send(cmd).is_err() {
                            break;
                        }
                    }
                    Err(e) => emit(&BridgeOutMessage::Error {
                        message: format!("Invalid command: {}", e),
                    }),
                },
                Err(_) => break,
            }
        }
    });

    let mut current: Option<Turn> = None;

    loop {
        tokio::select! {
            cmd = rx.recv() => {
                let Some(cmd) = cmd else { break };
                debug!(?cmd, "Bridge command");
                match cmd {
                    BridgeInCommand::Prompt { text } => {
                        if current.is_some() {
                            emit(&BridgeOutMessage::done(&Ok(SubmitOutcome::Busy)));
                            continue;
                        }
                        let session = session.clone();
                        current = Some(tokio::spawn(async move { session.submit(&text).await }));
                    }
                    // The running turn winds down and reports `done` itself
                    BridgeInCommand::Cancel => {
                        session.stop().await;
                    }
                    BridgeInCommand::New => session.new_conversation().await,
                    BridgeInCommand::Status => emit(&BridgeOutMessage::Status {
                        thread_id: session.thread_id(),
                        connection: session.connection_state(),
                        health: session.health(),
                        loading: session.is_loading(),
                        messages: session.messages().len(),
                    }),
                    BridgeInCommand::Shutdown => break,
                }
            }
            event = events.recv() => {
                if let Ok(event) = event {
                    if let Some(msg) = BridgeOutMessage::from_event(event) {
                        emit(&msg);
                    }
                }
            }
            finished = wait_turn(&mut current) => {
                current = None;
                // Let the last events of the turn go out before `done`
                for event in events.drain() {
                    if let Some(msg) = BridgeOutMessage::from_event(event) {
                        emit(&msg);
                    }
                }
                match finished {
                    Ok(result) => {
                        if let Err(ChatError::EmptyMessage) = &result {
                            emit(&BridgeOutMessage::Error { message: ChatError::EmptyMessage.to_string() });
                        }
                        emit(&BridgeOutMessage::done(&result));
                    }
                    Err(e) => emit(&BridgeOutMessage::Error { message: e.to_string() }),
                }
            }
        }
    }

    if let Some(turn) = current.take() {
        turn.abort();
    }
    session.shutdown().await;
    Ok(())
}
