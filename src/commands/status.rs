//! Server reachability and push endpoint details.

use clap::Args;
use clipshare_core::{HttpClient, SyncError};

use super::CommandError;
use crate::config::Config;

/// Show server status
#[derive(Args)]
pub struct StatusCommand;

impl StatusCommand {
    pub async fn run(&self, config: &Config) -> Result<(), CommandError> {
        let server_url = &config.server_url.value;
        let client = HttpClient::new(server_url.as_str());

        println!("Server Status");
        println!("=============");
        println!();
        println!("Server:  {} ({})", server_url, config.server_url.source);

        print!("Status:  ");
        match client.check_server().await {
            Ok(health) => println!("✓ {} (version {})", health.status, health.version),
            Err(SyncError::ConnectionError(_)) => {
                println!("✗ unreachable");
                return Ok(());
            }
            Err(e) => {
                println!("✗ error: {}", e);
                return Ok(());
            }
        }

        let info = client.fetch_socket_info().await?;
        println!("Push:    {}", info.ws_url());
        println!(
            "Retry:   {} attempt(s), {} ms apart",
            config.sync.max_reconnect_attempts.value, config.sync.reconnect_interval_ms.value
        );

        Ok(())
    }
}
