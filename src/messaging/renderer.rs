//! Terminal renderer for chat events.

use std::io::{stdout, Write};

use crossterm::{
    queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor},
    terminal::{Clear, ClearType},
    cursor::MoveTo,
};

use super::{ChatEvent, MessageLevel, TurnEvent};
use crate::backend::HealthStatus;
use crate::connection::ConnectionState;

/// Render style configuration.
#[derive(Debug, Clone)]
pub struct RenderStyle {
    pub info_color: Color,
    pub success_color: Color,
    pub warning_color: Color,
    pub error_color: Color,
    pub assistant_color: Color,
    /// Print connection and thread changes as dim status lines.
    pub show_status: bool,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            info_color: Color::White,
            success_color: Color::Green,
            warning_color: Color::Yellow,
            error_color: Color::Red,
            assistant_color: Color::Reset,
            show_status: false,
        }
    }
}

/// Renders [`ChatEvent`]s to a terminal (or any writer).
pub struct TerminalRenderer<W: Write = std::io::Stdout> {
    style: RenderStyle,
    out: W,
    /// A streamed reply is mid-line.
    in_stream: bool,
}

impl TerminalRenderer {
    /// Create a renderer on stdout.
    pub fn with_style(style: RenderStyle) -> Self {
        Self::with_writer(stdout(), style)
    }
}

impl<W: Write> TerminalRenderer<W> {
    pub fn with_writer(out: W, style: RenderStyle) -> Self {
        Self {
            style,
            out,
            in_stream: false,
        }
    }

    /// Render one event.
    pub fn render(&mut self, event: &ChatEvent) -> std::io::Result<()> {
        match event {
            ChatEvent::TextDelta(delta) => {
                self.in_stream = true;
                queue!(
                    self.out,
                    SetForegroundColor(self.style.assistant_color),
                    Print(&delta.text),
                    ResetColor
                )?;
            }
            ChatEvent::AssistantMessage(msg) => {
                self.end_stream()?;
                queue!(
                    self.out,
                    SetForegroundColor(self.style.assistant_color),
                    Print(&msg.content),
                    Print("\n"),
                    ResetColor
                )?;
            }
            // Echoed by the line editor already.
            ChatEvent::UserMessage(_) => {}
            ChatEvent::Turn(turn) => self.render_turn(turn)?,
            ChatEvent::Text(text) => {
                self.end_stream()?;
                self.render_text(text.level, &text.text)?;
            }
            ChatEvent::ThreadAssigned { thread_id } => {
                if self.style.show_status {
                    self.render_status(&format!("thread {}", thread_id))?;
                }
            }
            ChatEvent::Connection { state } => self.render_connection(*state)?,
            ChatEvent::Health { status } => self.render_health(*status)?,
            ChatEvent::Clear => {
                self.in_stream = false;
                queue!(self.out, Clear(ClearType::All), MoveTo(0, 0))?;
            }
        }
        self.out.flush()
    }

    fn end_stream(&mut self) -> std::io::Result<()> {
        if self.in_stream {
            self.in_stream = false;
            queue!(self.out, Print("\n"))?;
        }
        Ok(())
    }

    fn render_turn(&mut self, turn: &TurnEvent) -> std::io::Result<()> {
        match turn {
            TurnEvent::Completed { .. } => self.end_stream(),
            TurnEvent::Failed { reason } => {
                self.end_stream()?;
                self.render_text(MessageLevel::Error, reason)
            }
            TurnEvent::Cancelled => {
                self.end_stream()?;
                self.render_status("stopped")
            }
        }
    }

    fn render_connection(&mut self, state: ConnectionState) -> std::io::Result<()> {
        match state {
            ConnectionState::Errored => {
                self.end_stream()?;
                self.render_text(MessageLevel::Warning, "Streaming connection lost")
            }
            _ if self.style.show_status => {
                self.end_stream()?;
                self.render_status(&format!("connection {}", state))
            }
            _ => Ok(()),
        }
    }

    fn render_health(&mut self, status: HealthStatus) -> std::io::Result<()> {
        self.end_stream()?;
        match status {
            HealthStatus::Unreachable => {
                self.render_text(MessageLevel::Warning, "Backend is unreachable")
            }
            HealthStatus::Degraded => self.render_text(MessageLevel::Warning, "Backend is degraded"),
            _ if self.style.show_status => self.render_status(&format!("backend {}", status)),
            _ => Ok(()),
        }
    }

    fn render_text(&mut self, level: MessageLevel, text: &str) -> std::io::Result<()> {
        let color = match level {
            MessageLevel::Info => self.style.info_color,
            MessageLevel::Success => self.style.success_color,
            MessageLevel::Warning => self.style.warning_color,
            MessageLevel::Error => self.style.error_color,
            MessageLevel::Debug => Color::DarkGrey,
        };

        let prefix = match level {
            MessageLevel::Success => "✓ ",
            MessageLevel::Warning => "⚠ ",
            MessageLevel::Error => "✗ ",
            _ => "",
        };

        queue!(
            self.out,
            SetForegroundColor(color),
            Print(prefix),
            Print(text),
            Print("\n"),
            ResetColor
        )
    }

    fn render_status(&mut self, text: &str) -> std::io::Result<()> {
        queue!(
            self.out,
            SetAttribute(Attribute::Dim),
            Print("[ "),
            Print(text),
            Print(" ]\n"),
            SetAttribute(Attribute::Reset)
        )
    }
}
