//! One-shot board commands: list, delete and download.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, ValueEnum};
use clipshare_core::sync::{ChannelEvent, WebSocketConnector};
use clipshare_core::{
    ConnectionState, HttpClient, Item, Payload, ProtocolMessage, SyncChannel, SyncCoordinator,
};
use tokio::sync::mpsc;

use super::CommandError;
use crate::config::Config;
use crate::render::{format_size, item_line};

/// How long to wait for the server to confirm a delete
const DELETE_CONFIRM_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// A live connection holding the current board.
pub(crate) struct BoardConnection {
    server_url: String,
    channel: SyncChannel,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    coordinator: SyncCoordinator,
}

impl BoardConnection {
    /// Connects and waits for the server's initial `full`.
    pub(crate) async fn open(config: &Config) -> Result<Self, CommandError> {
        let server_url = &config.server_url.value;
        let info = HttpClient::new(server_url.as_str())
            .fetch_socket_info()
            .await?;

        let (channel, events) = SyncChannel::spawn(
            WebSocketConnector::new(info.ws_url()),
            config.sync.channel_config(),
        );

        let mut board = Self {
            server_url: server_url.clone(),
            channel,
            events,
            coordinator: SyncCoordinator::new(),
        };

        loop {
            match board.events.recv().await {
                Some(ChannelEvent::Message(message @ ProtocolMessage::Full { .. })) => {
                    board.coordinator.apply_message(message);
                    return Ok(board);
                }
                Some(ChannelEvent::Message(message)) => {
                    board.coordinator.apply_message(message);
                }
                Some(ChannelEvent::StateChanged(ConnectionState::ClosedFinal)) | None => {
                    return Err(CommandError::Unreachable(server_url.clone()));
                }
                Some(ChannelEvent::StateChanged(state)) => {
                    tracing::debug!("Push channel {}", state);
                }
            }
        }
    }

    pub(crate) fn items(&self) -> Vec<Item> {
        self.coordinator.snapshot()
    }

    /// Finds the single item whose hash starts with `prefix`.
    pub(crate) fn resolve(&self, prefix: &str) -> Result<Item, CommandError> {
        resolve_prefix(&self.coordinator, prefix)
    }

    /// Sends a delete and waits until the server broadcasts it back.
    async fn delete(&mut self, item: &Item) -> Result<bool, CommandError> {
        if !self.channel.send(ProtocolMessage::delete(item.hash.clone())) {
            return Err(CommandError::Unreachable(self.server_url.clone()));
        }

        let confirmed = tokio::time::timeout(DELETE_CONFIRM_TIMEOUT, async {
            while let Some(event) = self.events.recv().await {
                if let ChannelEvent::Message(message) = event {
                    self.coordinator.apply_message(message);
                    if !self.coordinator.contains(&item.hash) {
                        return true;
                    }
                }
            }
            false
        })
        .await
        .unwrap_or(false);

        Ok(confirmed)
    }

    pub(crate) async fn close(mut self) {
        self.channel.shutdown().await;
    }
}

pub(crate) fn resolve_prefix(
    coordinator: &SyncCoordinator,
    prefix: &str,
) -> Result<Item, CommandError> {
    match coordinator.find_by_prefix(prefix).as_slice() {
        [] => Err(CommandError::NotFound(prefix.to_string())),
        [item] => Ok((*item).clone()),
        matches => Err(CommandError::Ambiguous(prefix.to_string(), matches.len())),
    }
}

/// List items on the board
#[derive(Args)]
pub struct ListCommand {
    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

impl ListCommand {
    pub async fn run(&self, config: &Config) -> Result<(), CommandError> {
        let board = BoardConnection::open(config).await?;
        let items = board.items();
        board.close().await;

        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(&items)
                    .map_err(|e| CommandError::IoError(e.into()))?;
                println!("{}", json);
            }
            OutputFormat::Text => {
                if items.is_empty() {
                    println!("The board is empty");
                    return Ok(());
                }

                println!(
                    "{:<8}  {:<4}  {:<35}  {:>10}  CREATED",
                    "HASH", "TYPE", "CONTENT", "SIZE"
                );
                println!("{}", "-".repeat(86));
                for item in &items {
                    println!("{}", item_line(item));
                }
                println!("\nTotal: {} item(s)", items.len());
            }
        }

        Ok(())
    }
}

/// Remove an item from the board
#[derive(Args)]
pub struct DeleteCommand {
    /// Content hash or a unique prefix of it
    hash: String,
}

impl DeleteCommand {
    pub async fn run(&self, config: &Config) -> Result<(), CommandError> {
        let mut board = BoardConnection::open(config).await?;
        let item = match board.resolve(&self.hash) {
            Ok(item) => item,
            Err(e) => {
                board.close().await;
                return Err(e);
            }
        };

        let confirmed = board.delete(&item).await;
        board.close().await;

        if confirmed? {
            println!("Deleted {}", item.hash.short());
        } else {
            println!(
                "Delete of {} sent, but the server did not confirm it",
                item.hash.short()
            );
        }
        Ok(())
    }
}

/// Save a file from the board
#[derive(Args)]
pub struct DownloadCommand {
    /// Content hash or a unique prefix of it
    hash: String,

    /// Where to write the file (default: its name in the current directory)
    #[arg(long, short)]
    output: Option<PathBuf>,
}

impl DownloadCommand {
    pub async fn run(&self, config: &Config) -> Result<(), CommandError> {
        let board = BoardConnection::open(config).await?;
        let item = board.resolve(&self.hash);
        board.close().await;
        let item = item?;

        let url = item
            .url()
            .ok_or_else(|| CommandError::NotAFile(self.hash.clone()))?;

        let bytes = HttpClient::new(config.server_url.value.as_str())
            .download(url)
            .await?;

        let output = self
            .output
            .clone()
            .unwrap_or_else(|| default_output_path(&item));
        tokio::fs::write(&output, &bytes).await?;

        println!(
            "Saved {} ({}) to {}",
            item.hash.short(),
            format_size(bytes.len() as u64),
            output.display()
        );
        Ok(())
    }
}

/// The item's file name, stripped of any directory part.
fn default_output_path(item: &Item) -> PathBuf {
    let name = match &item.payload {
        Payload::File {
            file_name: Some(name),
            ..
        } => Path::new(name).file_name(),
        _ => None,
    };
    name.map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(item.hash.as_str()))
}
