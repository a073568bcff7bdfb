//! Live view of the board.
//!
//! Lines typed on stdin are shared as text. Lines starting with `/` are
//! commands: `/file <path>`, `/delete <hash>`, `/refresh` and `/quit`.

use std::path::Path;

use clap::Args;
use clipshare_core::{Content, HashPrefix, Intent, SyncSession};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use super::CommandError;
use crate::config::Config;
use crate::render::TerminalRenderer;

/// Follow the board live and share what you type
#[derive(Args)]
pub struct WatchCommand {
    /// Only follow the board, ignore stdin
    #[arg(long)]
    read_only: bool,
}

impl WatchCommand {
    pub async fn run(&self, config: &Config) -> Result<(), CommandError> {
        let mut session = SyncSession::connect(
            &config.server_url.value,
            config.sync.channel_config(),
            TerminalRenderer::new(),
        )
        .await?;

        let (intents, intent_rx) = mpsc::unbounded_channel();

        if !self.read_only {
            tokio::spawn(read_intents(intents.clone()));
        }

        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            let _ = intents.send(Intent::Shutdown);
        });

        session.run(intent_rx).await;
        Ok(())
    }
}

/// What a line typed in watch mode asks for.
#[derive(Debug, PartialEq)]
enum Line {
    Intent(Intent),
    File(String),
    Ignored,
    Unknown(String),
}

fn parse_line(line: &str) -> Line {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.trim().is_empty() {
        return Line::Ignored;
    }

    let Some(command) = trimmed.strip_prefix('/') else {
        return Line::Intent(Intent::Share(Content::Text(trimmed.to_string())));
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };

    match (name, arg) {
        ("quit", _) => Line::Intent(Intent::Shutdown),
        ("refresh", _) => Line::Intent(Intent::Refresh),
        ("delete", prefix) if !prefix.is_empty() => match prefix.parse::<HashPrefix>() {
            Ok(prefix) => Line::Intent(Intent::Delete(prefix)),
            Err(_) => Line::Unknown(trimmed.to_string()),
        },
        ("file", path) if !path.is_empty() => Line::File(path.to_string()),
        _ => Line::Unknown(trimmed.to_string()),
    }
}

async fn read_intents(intents: mpsc::UnboundedSender<Intent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("Failed to read stdin: {}", e);
                return;
            }
        };

        let intent = match parse_line(&line) {
            Line::Intent(intent) => intent,
            Line::File(path) => match read_file(&path).await {
                Ok(content) => Intent::Share(content),
                Err(e) => {
                    eprintln!("! Cannot read {}: {}", path, e);
                    continue;
                }
            },
            Line::Ignored => continue,
            Line::Unknown(line) => {
                eprintln!("! Unknown command: {}", line);
                continue;
            }
        };

        if intents.send(intent).is_err() {
            return;
        }
    }
}

async fn read_file(path: &str) -> std::io::Result<Content> {
    let bytes = tokio::fs::read(path).await?;
    let name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string());
    Ok(Content::File { name, bytes })
}
