//! deskit command line client
//!
//! Drives a running `deskitd`: run single actions the way an orchestrator
//! would, record captured input, or ask the daemon for its status.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::info;

use deskit_common::{ConversationBlock, Role};
use deskitd_client::{
    CaptureState, CaptureSubscriber, ClientSettings, ConversationStore, DeskitClient, Dispatcher,
};

#[derive(Parser, Debug)]
#[command(name = "deskit", version)]
#[command(about = "Command line client for the deskit daemon")]
struct Cli {
    /// Socket path (overrides DESKIT_SOCK)
    #[arg(long)]
    socket: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one action, e.g. `deskit act click_mouse '{"at":{"x":10,"y":20}}'`
    Act {
        /// Action tag, with or without the `computer_` prefix
        action: String,
        /// JSON object with the action's fields
        #[arg(default_value = "{}")]
        input: String,
        /// Pause before the follow-up screenshot, in milliseconds
        #[arg(long)]
        settle_ms: Option<u64>,
    },
    /// Print captured human input as JSON lines until interrupted
    Watch {
        #[arg(long, default_value = "cli")]
        session: String,
    },
    /// Forward one observed action (JSON) to the daemon's push channel
    Capture { observed: String },
    /// Show daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let mut settings = ClientSettings::from_env();
    if let Some(socket) = cli.socket {
        settings.sock_path = socket;
    }
    let client = Arc::new(DeskitClient::from_settings(&settings));

    match cli.command {
        Command::Act {
            action,
            input,
            settle_ms,
        } => {
            let input: Value =
                serde_json::from_str(&input).context("action input must be a JSON object")?;
            let settle = settle_ms
                .map(Duration::from_millis)
                .unwrap_or(settings.settle_delay);
            let dispatcher = Dispatcher::new(client).with_settle_delay(settle);
            let block = dispatcher.dispatch_tool_use("toolu_cli", &action, &input).await;
            println!("{}", serde_json::to_string_pretty(&elide_media(block))?);
        }
        Command::Watch { session } => {
            let subscriber = CaptureSubscriber::new(client, Arc::new(StdoutStore));
            subscriber
                .start(&session)
                .await
                .context("Failed to subscribe to deskitd")?;
            info!("Watching session {}; press Ctrl+C to stop", session);
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    _ = tokio::time::sleep(Duration::from_millis(500)) => {
                        if subscriber.state() == CaptureState::Disconnected {
                            info!("deskitd closed the push channel");
                            break;
                        }
                    }
                }
            }
            subscriber.stop().await;
        }
        Command::Capture { observed } => {
            let observed: Value =
                serde_json::from_str(&observed).context("observed action must be JSON")?;
            let published = client.capture(observed).await?;
            println!("{}", json!({ "published": published }));
        }
        Command::Status => {
            let status = client.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}

/// Prints every appended message as one JSON line.
struct StdoutStore;

#[async_trait]
impl ConversationStore for StdoutStore {
    async fn append(
        &self,
        session_id: &str,
        role: Role,
        blocks: Vec<ConversationBlock>,
    ) -> Result<()> {
        let blocks: Vec<ConversationBlock> = blocks.into_iter().map(elide_media).collect();
        let line = json!({ "session": session_id, "role": role, "blocks": blocks });
        println!("{}", serde_json::to_string(&line)?);
        Ok(())
    }
}

/// Replaces base64 payloads with their length so output stays readable.
fn elide_media(block: ConversationBlock) -> ConversationBlock {
    match block {
        ConversationBlock::Image { mut source } => {
            source.data = format!("<{} base64 chars>", source.data.len());
            ConversationBlock::Image { source }
        }
        ConversationBlock::Document {
            mut source,
            name,
            size,
        } => {
            source.data = format!("<{} base64 chars>", source.data.len());
            ConversationBlock::Document { source, name, size }
        }
        ConversationBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => ConversationBlock::ToolResult {
            tool_use_id,
            content: content.into_iter().map(elide_media).collect(),
            is_error,
        },
        ConversationBlock::UserAction { content } => ConversationBlock::UserAction {
            content: content.into_iter().map(elide_media).collect(),
        },
        other => other,
    }
}
