use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod render;

use commands::{
    ConfigCommand, DeleteCommand, DownloadCommand, ListCommand, SendCommand, StatusCommand,
    UploadCommand, WatchCommand,
};
use config::Config;

#[derive(Parser)]
#[command(name = "clipshare")]
#[command(version)]
#[command(about = "A shared clipboard and file board", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the board live
    Watch(WatchCommand),

    /// Share a text snippet
    Send(SendCommand),

    /// Upload a file
    Upload(UploadCommand),

    /// List items on the board
    List(ListCommand),

    /// Remove an item from the board
    Delete(DeleteCommand),

    /// Save a file from the board
    Download(DownloadCommand),

    /// Show server status
    Status(StatusCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Watch(cmd)) => cmd.run(&config).await?,
        Some(Commands::Send(cmd)) => cmd.run(&config).await?,
        Some(Commands::Upload(cmd)) => cmd.run(&config).await?,
        Some(Commands::List(cmd)) => cmd.run(&config).await?,
        Some(Commands::Delete(cmd)) => cmd.run(&config).await?,
        Some(Commands::Download(cmd)) => cmd.run(&config).await?,
        Some(Commands::Status(cmd)) => cmd.run(&config).await?,
        Some(Commands::Config(cmd)) => cmd.run(&config)?,
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
