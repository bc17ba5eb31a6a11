//! Interactive REPL implementation.

use std::sync::Arc;

use reedline::{FileBackedHistory, Signal};
use tracing::{debug, warn};

use super::prompt::{create_reedline, RelayPrompt, COMMANDS};
use crate::config::XdgDirs;
use crate::messaging::{ChatEvent, EventReceiver, RenderStyle, TerminalRenderer};
use crate::session::{ChatError, ChatSession, SubmitOutcome};

/// REPL state.
pub struct Repl {
    session: Arc<ChatSession>,
    renderer: TerminalRenderer,
    events: EventReceiver,
}

impl Repl {
    pub fn new(session: Arc<ChatSession>) -> Self {
        Self::with_style(session, RenderStyle::default())
    }

    pub fn with_style(session: Arc<ChatSession>, style: RenderStyle) -> Self {
        let events = session.subscribe();
        Self {
            session,
            renderer: TerminalRenderer::with_style(style),
            events,
        }
    }

    /// Run the REPL loop.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let mut line_editor = create_reedline();
        let dirs = XdgDirs::new();
        if let Err(e) = dirs.ensure_dirs() {
            debug!("Failed to create XDG directories: {}", e);
        }
        match FileBackedHistory::with_file(500, dirs.history_file()) {
            Ok(history) => line_editor = line_editor.with_history(Box::new(history)),
            Err(e) => debug!("History unavailable: {}", e),
        }

        loop {
            self.flush_events();
            let prompt = RelayPrompt::new(self.session.thread_id(), self.session.connection_state());

            match line_editor.read_line(&prompt) {
                Ok(Signal::Success(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if line.starts_with('/') {
                        if self.handle_command(line).await {
                            break;
                        }
                        continue;
                    }
                    self.handle_prompt(line).await;
                }
                Ok(Signal::CtrlC) => {
                    println!("^C");
                    continue;
                }
                Ok(Signal::CtrlD) => break,
                Err(err) => {
                    self.show(ChatEvent::error(format!("Readline error: {}", err)));
                    break;
                }
            }
        }

        self.session.shutdown().await;
        Ok(())
    }

    /// Submit one message, rendering events as they arrive. Ctrl-C stops
    /// the turn.
    pub async fn handle_prompt(&mut self, text: &str) {
        let session = Arc::clone(&self.session);
        let result = {
            let submit = session.submit(text);
            tokio::pin!(submit);
            loop {
                tokio::select! {
                    result = &mut submit => break result,
                    event = self.events.recv() => {
                        if let Ok(event) = event {
                            let _ = self.renderer.render(&event);
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        let (result, stopped) = tokio::join!(&mut submit, session.stop());
                        if !stopped {
                            warn!("Interrupt arrived with nothing pending");
                        }
                        break result;
                    }
                }
            }
        };

        match result {
            Ok(SubmitOutcome::Busy) => {
                self.show(ChatEvent::warning("Still waiting for the previous reply"));
            }
            Ok(outcome) => debug!(?outcome, "Turn finished"),
            // Backend failures are already on the bus as error text
            Err(ChatError::Backend(_)) => {}
            Err(e) => self.show(ChatEvent::error(e.to_string())),
        }
        self.flush_events();
    }

    /// Handle a slash command. Returns `true` to exit.
    async fn handle_command(&mut self, input: &str) -> bool {
        let cmd = input.split_whitespace().next().unwrap_or("").to_lowercase();

        match cmd.as_str() {
            "/quit" | "/exit" | "/q" => return true,
            "/new" => {
                self.session.new_conversation().await;
                self.flush_events();
                self.show(ChatEvent::success("Started a new conversation"));
            }
            "/status" => {
                for line in status_lines(&self.session) {
                    self.show(ChatEvent::info(line));
                }
            }
            "/clear" => self.show(ChatEvent::Clear),
            "/help" | "/h" | "/?" => {
                for (name, desc) in COMMANDS {
                    self.show(ChatEvent::info(format!("  {:<10} {}", name, desc)));
                }
            }
            other => self.show(ChatEvent::warning(format!("Unknown command: {}", other))),
        }
        false
    }

    fn show(&mut self, event: ChatEvent) {
        let _ = self.renderer.render(&event);
    }

    fn flush_events(&mut self) {
        for event in self.events.drain() {
            let _ = self.renderer.render(&event);
        }
    }
}

/// Lines printed by `/status`.
pub fn status_lines(session: &ChatSession) -> Vec<String> {
    let mut lines = vec![
        format!(
            "thread:     {}",
            session.thread_id().unwrap_or_else(|| "(none yet)".to_string())
        ),
        format!("connection: {}", session.connection_state()),
        format!("transport:  {}", session.mode()),
        format!("backend:    {}", session.health()),
        format!("messages:   {}", session.messages().len()),
    ];
    if let Some(error) = session.error() {
        lines.push(format!("error:      {}", error));
    }
    lines
}
