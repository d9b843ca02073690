//! Terminal chat client entry point
//!
//! Run with:
//! ```bash
//! CHAT_CHANNEL_ID=general cargo run -p chat-client
//! ```
//!
//! Configuration is loaded from environment variables or a `.env` file.
//! Every line read from stdin is sent to the channel.

use anyhow::Context;
use chat_client::ChatSession;
use chat_common::{try_init_tracing_with_config, AppConfig, TracingConfig};
use chat_core::{Message, ReactionSummary, UserId};
use chat_sync::{SendMessage, SyncUpdate};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "Client stopped");
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("failed to load configuration")?;

    // Initialize tracing
    if let Err(e) = try_init_tracing_with_config(TracingConfig::from_settings(&config.app)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    let channel_id = std::env::var("CHAT_CHANNEL_ID").context("CHAT_CHANNEL_ID is not set")?;
    if config.auth.token.is_none() {
        anyhow::bail!("AUTH_TOKEN is not set");
    }

    info!(env = ?config.app.env, gateway = %config.gateway.url, "Configuration loaded");

    let session = ChatSession::from_config(&config).await?;
    let me = session.user_id().clone();
    let handle = session.handle().clone();
    let mut updates = handle.subscribe_updates();
    handle.switch_channel(channel_id.as_str()).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let outcome = loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("failed to read stdin")? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => {
                        if let Err(e) = handle.send(SendMessage::new(channel_id.as_str(), line)).await {
                            if e.is_fatal() {
                                break Err(e.into());
                            }
                            warn!(error = %e, "Message not sent");
                        }
                    }
                    None => break Ok(()),
                }
            }

            update = updates.recv() => {
                match update {
                    Ok(update) => print_update(&update, &me),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Display fell behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => break Ok(()),
                }
            }

            err = session.terminated() => break Err(err.into()),
        }
    };

    session.shutdown().await;
    outcome
}

const PREVIEW_LEN: usize = 120;

fn print_update(update: &SyncUpdate, me: &UserId) {
    match update {
        SyncUpdate::Scope(snapshot) => {
            let status = if snapshot.loading { " (loading)" } else { "" };
            println!("== {}{} ==", snapshot.scope, status);
            for message in &snapshot.messages {
                println!("{}", message_line(message, me));
            }
        }
        SyncUpdate::Typing { scope, users } if !users.is_empty() => {
            let names: Vec<&str> = users.iter().map(|u| u.as_str()).collect();
            println!("-- {} typing in {scope}", names.join(", "));
        }
        SyncUpdate::Typing { .. } => {}
        SyncUpdate::Closed(scope) => println!("-- left {scope}"),
        SyncUpdate::Failed(failure) => {
            println!("!! {:?} failed: {}", failure.action, failure.error);
        }
    }
}

/// `…` marks a pending send, `@` a mention of the viewer, `*` their own reaction
fn message_line(message: &Message, me: &UserId) -> String {
    let marker = if message.is_provisional() {
        "…"
    } else if message.mentions_user(me) {
        "@"
    } else {
        " "
    };
    let mut line = format!("{marker}[{}] {}: {}", message.id, message.author_id, message.preview(PREVIEW_LEN));
    if message.content.len() > PREVIEW_LEN {
        line.push('…');
    }
    if message.edited {
        line.push_str(" (edited)");
    }
    for reaction in &message.reactions {
        let summary = ReactionSummary::for_viewer(reaction, me);
        line.push_str(&format!("  {}{}", summary.emoji, summary.count));
        if summary.me {
            line.push('*');
        }
    }
    line
}
