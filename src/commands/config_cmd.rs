use clap::{Args, Subcommand};
use std::fs;
use std::io::Write;

use super::board::OutputFormat;
use crate::config::Config;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Initialize configuration file
    Init,
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!("server_url: {}", config.server_url.value);
                        println!("  source: {}", config.server_url.source);
                        println!();

                        let sync = &config.sync;
                        println!(
                            "sync.max_reconnect_attempts: {}",
                            sync.max_reconnect_attempts.value
                        );
                        println!("  source: {}", sync.max_reconnect_attempts.source);
                        println!(
                            "sync.reconnect_interval_ms: {}",
                            sync.reconnect_interval_ms.value
                        );
                        println!("  source: {}", sync.reconnect_interval_ms.source);
                        println!(
                            "sync.heartbeat_interval_secs: {}",
                            sync.heartbeat_interval_secs.value
                        );
                        println!("  source: {}", sync.heartbeat_interval_secs.source);
                        println!(
                            "sync.connect_timeout_secs: {}",
                            sync.connect_timeout_secs.value
                        );
                        println!("  source: {}", sync.connect_timeout_secs.source);
                    }
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                let config_path = Config::default_config_path();

                // Check if config already exists
                if config_path.exists() {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'clipshare config show' to view current configuration.");
                    return Ok(());
                }

                // Create parent directory
                if let Some(parent) = config_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                // Write default config
                let default_config = r#"# clipshare configuration

# Board server (default: http://localhost:8080)
server_url: http://localhost:8080

sync:
  # Reconnect attempts after a lost connection before giving up
  max_reconnect_attempts: 3
  # Delay between reconnect attempts
  reconnect_interval_ms: 3000
  # Keepalive period while connected (0 disables)
  heartbeat_interval_secs: 30
  # Time allowed to open a connection (0 waits forever)
  connect_timeout_secs: 10
"#;

                let mut file = fs::File::create(&config_path)?;
                file.write_all(default_config.as_bytes())?;

                println!("Created config file: {}", config_path.display());
                println!("\nEdit this file to customize your settings.");
                Ok(())
            }
        }
    }
}
