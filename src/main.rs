//! Chatrelay - terminal client for a streaming chat backend.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chatrelay::cli;
use chatrelay::config::{ClientConfig, TransportMode};
use chatrelay::ChatSession;

/// Chatrelay - talk to a chat backend from the terminal
#[derive(Parser, Debug)]
#[command(name = "chatrelay")]
#[command(version, about, long_about = None)]
struct Args {
    /// HTTP base URL of the backend
    #[arg(long, env = "CHATRELAY_API_URL")]
    url: Option<String>,

    /// Streaming base URL (derived from --url when omitted)
    #[arg(long, env = "CHATRELAY_WS_URL")]
    ws_url: Option<String>,

    /// Seconds to wait for the streaming connection to open
    #[arg(long)]
    connect_timeout: Option<u64>,

    /// Send every message as a single HTTP request
    #[arg(long)]
    one_shot: bool,

    /// Ask the backend to drop the thread on /new
    #[arg(long)]
    clear_remote: bool,

    /// Execute a single prompt and exit
    #[arg(short, long)]
    prompt: Option<String>,

    /// Run in bridge mode for external UI
    #[arg(long)]
    bridge: bool,

    /// Enable debug logging (equivalent to RUST_LOG=debug)
    #[arg(short = 'd', long)]
    debug: bool,

    /// Enable verbose logging (equivalent to RUST_LOG=trace)
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl Args {
    /// Layer command-line overrides on top of the loaded config.
    fn apply(&self, config: &mut ClientConfig) {
        if let Some(url) = &self.url {
            config.base_url = url.clone();
        }
        if let Some(ws_url) = &self.ws_url {
            config.ws_url = Some(ws_url.clone());
        }
        if let Some(secs) = self.connect_timeout {
            config.connect_timeout_secs = secs;
        }
        if self.one_shot {
            config.transport = TransportMode::OneShot;
        }
        if self.clear_remote {
            config.clear_remote_on_reset = true;
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(async {
        let default_filter = if args.verbose {
            "trace"
        } else if args.debug {
            "debug"
        } else {
            "warn" // Quiet by default for normal use
        };

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();

        if args.debug || args.verbose {
            tracing::info!("Debug logging enabled");
        }

        let mut config = ClientConfig::load().context("Failed to load configuration")?;
        args.apply(&mut config);
        let session = Arc::new(ChatSession::from_config(&config)?);
        tracing::debug!(base_url = %config.base_url, transport = %config.transport, "Session ready");

        if args.bridge {
            cli::bridge::run_bridge_mode(session).await?;
        } else if let Some(prompt) = args.prompt.as_deref() {
            cli::runner::run_single_prompt(session, prompt).await?;
        } else {
            cli::runner::run_interactive(session).await?;
        }

        Ok(())
    })
}
