//! Line editor setup: prompt, slash-command completion and highlighting.
//!
//! Type "/" then Tab to see commands.

use nu_ansi_term::{Color, Style};
use reedline::{
    ColumnarMenu, Completer, Emacs, Highlighter, KeyCode, KeyModifiers, MenuBuilder, Prompt,
    PromptEditMode, PromptHistorySearch, PromptHistorySearchStatus, Reedline, ReedlineEvent,
    ReedlineMenu, Span, StyledText, Suggestion,
};
use std::borrow::Cow;

use crate::connection::ConnectionState;

/// All slash commands with descriptions
pub const COMMANDS: &[(&str, &str)] = &[
    ("/clear", "Clear screen"),
    ("/exit", "Exit"),
    ("/help", "Show help"),
    ("/new", "New conversation"),
    ("/quit", "Exit"),
    ("/status", "Connection and thread status"),
];

/// Completes slash commands.
#[derive(Clone, Default)]
pub struct CommandCompleter;

impl Completer for CommandCompleter {
    fn complete(&mut self, line: &str, pos: usize) -> Vec<Suggestion> {
        if pos > line.len() {
            return Vec::new();
        }

        let input = &line[..pos];
        if !input.starts_with('/') || input.contains(' ') {
            return Vec::new();
        }

        let prefix = input.to_lowercase();
        COMMANDS
            .iter()
            .filter(|(cmd, _)| cmd.starts_with(&prefix))
            .map(|(cmd, desc)| Suggestion {
                value: cmd.to_string(),
                description: Some(desc.to_string()),
                extra: None,
                span: Span::new(0, pos),
                append_whitespace: false,
                style: None,
            })
            .collect()
    }
}

/// Prompt showing the thread and whether replies will stream.
pub struct RelayPrompt {
    pub thread_id: Option<String>,
    pub state: ConnectionState,
}

impl RelayPrompt {
    pub fn new(thread_id: Option<String>, state: ConnectionState) -> Self {
        Self { thread_id, state }
    }

    fn thread_label(&self) -> String {
        match &self.thread_id {
            // Ids are usually UUIDs; the head is enough to tell them apart.
            Some(id) => id.chars().take(8).collect(),
            None => "new".to_string(),
        }
    }
}

impl Prompt for RelayPrompt {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        let marker = if self.state == ConnectionState::Open {
            Color::Green.paint("●")
        } else {
            Color::DarkGray.paint("○")
        };
        Cow::Owned(format!(
            "{} {}",
            marker,
            Style::new().dimmed().paint(format!("[{}]", self.thread_label()))
        ))
    }

    fn render_prompt_right(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _mode: PromptEditMode) -> Cow<'_, str> {
        Cow::Borrowed(" › ")
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        Cow::Borrowed("... ")
    }

    fn render_prompt_history_search_indicator(&self, hs: PromptHistorySearch) -> Cow<'_, str> {
        let prefix = match hs.status {
            PromptHistorySearchStatus::Passing => "",
            PromptHistorySearchStatus::Failing => "failing ",
        };
        Cow::Owned(format!("({}search: {}) ", prefix, hs.term))
    }
}

/// Highlights known commands in cyan, unknown ones in yellow.
#[derive(Clone)]
pub struct CommandHighlighter;

impl Highlighter for CommandHighlighter {
    fn highlight(&self, line: &str, _cursor: usize) -> StyledText {
        let mut styled = StyledText::new();

        if line.starts_with('/') {
            let cmd_end = line.find(' ').unwrap_or(line.len());
            let cmd = &line[..cmd_end];
            let style = if COMMANDS.iter().any(|(c, _)| *c == cmd) {
                Style::new().fg(Color::Cyan).bold()
            } else {
                Style::new().fg(Color::Yellow)
            };
            styled.push((style, cmd.to_string()));
            if cmd_end < line.len() {
                styled.push((Style::default(), line[cmd_end..].to_string()));
            }
        } else {
            styled.push((Style::default(), line.to_string()));
        }

        styled
    }
}

/// Create reedline with Tab-triggered command menu.
pub fn create_reedline() -> Reedline {
    let completion_menu = Box::new(
        ColumnarMenu::default()
            .with_name("completion_menu")
            .with_columns(1)
            .with_column_padding(2)
            .with_text_style(Style::new().fg(Color::Default))
            .with_selected_text_style(Style::new().fg(Color::Black).on(Color::Cyan))
            .with_description_text_style(Style::new().fg(Color::DarkGray)),
    );

    let mut keybindings = reedline::default_emacs_keybindings();
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Tab,
        ReedlineEvent::UntilFound(vec![
            ReedlineEvent::Menu("completion_menu".to_string()),
            ReedlineEvent::MenuNext,
        ]),
    );
    keybindings.add_binding(
        KeyModifiers::SHIFT,
        KeyCode::BackTab,
        ReedlineEvent::MenuPrevious,
    );

    Reedline::create()
        .with_completer(Box::new(CommandCompleter))
        .with_menu(ReedlineMenu::EngineCompleter(completion_menu))
        .with_quick_completions(true)
        .with_highlighter(Box::new(CommandHighlighter))
        .with_edit_mode(Box::new(Emacs::new(keybindings)))
}
