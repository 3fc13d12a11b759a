// ABOUTME: Main entry point for the Gitter puppet: a ding-dong bot and a room listing command
// ABOUTME: Initializes logging and config, starts PuppetGitter, and reacts to its events until Ctrl-C

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use puppet_gitter::gitter::{list_visible_rooms, HttpConnector};
use puppet_gitter::{config::Config, logging, Puppet, PuppetEvent, PuppetGitter};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "puppet-gitter", version, about = "Gitter puppet adapter")]
struct Cli {
    /// Emit console logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Also write JSON logs to a daily rolling file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Answer "ding" with "dong" in every room (default)
    Run,
    /// Print the rooms visible to the account and exit
    Rooms,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _logging_guard = logging::init(cli.log_json, cli.log_dir.as_deref())?;

    dotenvy::dotenv().ok();
    let config = Config::load()?;
    tracing::info!(
        api_url = %config.gitter.api_url,
        stream_url = %config.gitter.stream_url,
        message_capacity = config.cache.message_capacity,
        message_ttl_secs = config.cache.message_ttl_secs,
        "Configuration loaded"
    );

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_bot(Arc::new(PuppetGitter::from_config(&config)?)).await,
        Command::Rooms => list_rooms(&config).await,
    }
}

async fn run_bot(puppet: Arc<PuppetGitter>) -> Result<()> {
    let mut events = puppet.event_stream();
    puppet.start().await.context("Failed to start Gitter puppet")?;
    tracing::info!("Bot ready - say ding in any room");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl-C, shutting down");
                break;
            }
            event = events.next() => {
                let Some(event) = event else { break };
                handle_event(&puppet, event).await;
            }
        }
    }

    puppet.stop().await.context("Failed to stop Gitter puppet")?;
    Ok(())
}

async fn handle_event(puppet: &Arc<PuppetGitter>, event: PuppetEvent) {
    match event {
        PuppetEvent::Login { contact_id } => tracing::info!(contact_id = %contact_id, "login"),
        PuppetEvent::Logout { contact_id, data } => {
            tracing::info!(contact_id = %contact_id, data = %data, "logout")
        }
        PuppetEvent::Error { data } => tracing::error!(data = %data, "puppet error"),
        PuppetEvent::Dong { data } => tracing::debug!(data = %data, "dong"),
        PuppetEvent::Message { message_id } => {
            let puppet = Arc::clone(puppet);
            tokio::spawn(async move {
                if let Err(e) = reply_to_ding(&puppet, &message_id).await {
                    tracing::warn!(
                        message_id = %message_id,
                        error = %e,
                        "Failed to handle message"
                    );
                }
            });
        }
    }
}

async fn reply_to_ding(puppet: &PuppetGitter, message_id: &str) -> Result<()> {
    let message = puppet.message_payload(message_id).await?;
    tracing::info!(
        message_id = %message.id,
        from_id = %message.from_id,
        message_type = ?message.message_type,
        "message: {}",
        message.text
    );

    if Some(&message.from_id) == puppet.self_id().as_ref() {
        return Ok(());
    }
    if message.text.trim() != "ding" {
        return Ok(());
    }
    let Some(room_id) = message.room_id else {
        return Ok(());
    };
    puppet.message_send_text(&room_id, "dong").await?;
    tracing::info!(room_id = %room_id, "Replied dong");
    Ok(())
}

async fn list_rooms(config: &Config) -> Result<()> {
    let connector = HttpConnector::new(config.gitter.clone());
    for room in list_visible_rooms(&connector).await? {
        println!("{}\t{}", room.id, room.name);
    }
    Ok(())
}
