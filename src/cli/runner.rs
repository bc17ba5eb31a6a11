//! CLI runner for interactive and single-prompt modes.

use std::sync::Arc;

use anyhow::bail;

use crate::cli::repl::Repl;
use crate::messaging::RenderStyle;
use crate::session::ChatSession;

/// Run a single prompt and exit.
pub async fn run_single_prompt(session: Arc<ChatSession>, prompt: &str) -> anyhow::Result<()> {
    session.init().await;

    let mut repl = Repl::new(session.clone());
    repl.handle_prompt(prompt).await;
    session.shutdown().await;

    if let Some(error) = session.error() {
        bail!(error);
    }
    match session.messages().last() {
        Some(last) if last.is_assistant() => match last.error() {
            Some(reason) => bail!("Reply failed: {}", reason),
            None => Ok(()),
        },
        _ => bail!("No reply received"),
    }
}

/// Run in interactive mode.
pub async fn run_interactive(session: Arc<ChatSession>) -> anyhow::Result<()> {
    print_banner(&session);
    session.init().await;

    // Thread and connection changes are worth a line when chatting
    let style = RenderStyle {
        show_status: true,
        ..Default::default()
    };
    let mut repl = Repl::with_style(session, style);
    repl.run().await
}

/// Print the welcome banner.
pub fn print_banner(session: &ChatSession) {
    println!();
    println!(
        "  \x1b[1;36mchatrelay\x1b[0m \x1b[2mv{}\x1b[0m",
        env!("CARGO_PKG_VERSION")
    );
    println!("  \x1b[2mtransport: {}\x1b[0m", session.mode());
    println!("  \x1b[2mType \x1b[0m\x1b[1;36m/help\x1b[0m\x1b[2m for commands, or start chatting!\x1b[0m");
    println!();
}

