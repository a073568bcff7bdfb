//! Putting text and files on the board.

use std::io::Read;
use std::path::PathBuf;

use clap::Args;
use clipshare_core::{Content, HttpClient, HttpUploader, Item};

use super::CommandError;
use crate::config::Config;
use crate::render::{format_progress, item_line};

/// Share a text snippet
#[derive(Args)]
pub struct SendCommand {
    /// Text to share (reads stdin when omitted)
    text: Option<String>,
}

impl SendCommand {
    pub async fn run(&self, config: &Config) -> Result<(), CommandError> {
        let text = match &self.text {
            Some(text) => text.clone(),
            None => {
                let mut buffer = String::new();
                std::io::stdin().read_to_string(&mut buffer)?;
                buffer
            }
        };

        if text.is_empty() {
            return Err(CommandError::IoError(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Nothing to send",
            )));
        }

        let item = upload(config, Content::Text(text)).await?;
        println!("{}", item_line(&item));
        Ok(())
    }
}

/// Upload a file
#[derive(Args)]
pub struct UploadCommand {
    /// File to upload
    path: PathBuf,
}

impl UploadCommand {
    pub async fn run(&self, config: &Config) -> Result<(), CommandError> {
        let metadata = tokio::fs::metadata(&self.path).await?;
        if !metadata.is_file() {
            return Err(CommandError::NotAFile(self.path.display().to_string()));
        }

        let bytes = tokio::fs::read(&self.path).await?;
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string());

        let item = upload(config, Content::File { name, bytes }).await?;
        println!("{}", item_line(&item));
        Ok(())
    }
}

async fn upload(config: &Config, content: Content) -> Result<Item, CommandError> {
    let uploader = HttpUploader::new(HttpClient::new(config.server_url.value.as_str()));
    let show_progress = matches!(content, Content::File { .. });

    let item = uploader
        .upload(&content, move |progress| {
            if show_progress {
                eprint!("\rUploading: {:>6}", format_progress(progress));
                if progress >= 1.0 {
                    eprintln!();
                }
            }
        })
        .await;

    if show_progress && item.is_err() {
        eprintln!();
    }
    Ok(item?)
}
