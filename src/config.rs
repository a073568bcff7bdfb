use clipshare_core::sync::{
    ChannelConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_HEARTBEAT_INTERVAL,
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_INTERVAL,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Push channel settings
#[derive(Debug, Clone, Serialize)]
pub struct SyncConfig {
    /// Reconnect attempts before giving up
    pub max_reconnect_attempts: ConfigValue<u32>,
    /// Fixed delay between reconnect attempts
    pub reconnect_interval_ms: ConfigValue<u64>,
    /// Heartbeat period while connected (0 disables)
    pub heartbeat_interval_secs: ConfigValue<u64>,
    /// Time allowed to open a connection (0 waits forever)
    pub connect_timeout_secs: ConfigValue<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: ConfigValue::new(
                DEFAULT_MAX_RECONNECT_ATTEMPTS,
                ConfigSource::Default,
            ),
            reconnect_interval_ms: ConfigValue::new(
                DEFAULT_RECONNECT_INTERVAL.as_millis() as u64,
                ConfigSource::Default,
            ),
            heartbeat_interval_secs: ConfigValue::new(
                DEFAULT_HEARTBEAT_INTERVAL.as_secs(),
                ConfigSource::Default,
            ),
            connect_timeout_secs: ConfigValue::new(
                DEFAULT_CONNECT_TIMEOUT.as_secs(),
                ConfigSource::Default,
            ),
        }
    }
}

impl SyncConfig {
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            max_reconnect_attempts: self.max_reconnect_attempts.value,
            reconnect_interval: Duration::from_millis(self.reconnect_interval_ms.value),
            connect_timeout: non_zero_secs(self.connect_timeout_secs.value),
            heartbeat_interval: non_zero_secs(self.heartbeat_interval_secs.value),
        }
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Board server URL
    pub server_url: ConfigValue<String>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    /// Push channel configuration
    pub sync: SyncConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    server_url: Option<String>,
    sync: Option<SyncConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct SyncConfigFile {
    max_reconnect_attempts: Option<u32>,
    reconnect_interval_ms: Option<u64>,
    heartbeat_interval_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        // Start with defaults
        let mut server_url =
            ConfigValue::new(DEFAULT_SERVER_URL.to_string(), ConfigSource::Default);
        let mut config_file = None;
        let mut sync = SyncConfig::default();

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(url) = file_config.server_url {
                server_url = ConfigValue::new(url, ConfigSource::File);
            }
            if let Some(file_sync) = file_config.sync {
                if let Some(attempts) = file_sync.max_reconnect_attempts {
                    sync.max_reconnect_attempts = ConfigValue::new(attempts, ConfigSource::File);
                }
                if let Some(ms) = file_sync.reconnect_interval_ms {
                    sync.reconnect_interval_ms = ConfigValue::new(ms, ConfigSource::File);
                }
                if let Some(secs) = file_sync.heartbeat_interval_secs {
                    sync.heartbeat_interval_secs = ConfigValue::new(secs, ConfigSource::File);
                }
                if let Some(secs) = file_sync.connect_timeout_secs {
                    sync.connect_timeout_secs = ConfigValue::new(secs, ConfigSource::File);
                }
            }
        }

        // Apply environment variable overrides
        if let Ok(url) = std::env::var("CLIPSHARE_SERVER_URL") {
            server_url = ConfigValue::new(url, ConfigSource::Environment);
        }
        if let Some(attempts) = env_number("CLIPSHARE_MAX_RECONNECT_ATTEMPTS")? {
            sync.max_reconnect_attempts = ConfigValue::new(attempts, ConfigSource::Environment);
        }
        if let Some(ms) = env_number("CLIPSHARE_RECONNECT_INTERVAL_MS")? {
            sync.reconnect_interval_ms = ConfigValue::new(ms, ConfigSource::Environment);
        }

        Ok(Self {
            server_url,
            config_file,
            sync,
        })
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/clipshare/
    /// - macOS: ~/Library/Application Support/clipshare/
    /// - Windows: %APPDATA%/clipshare/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("clipshare")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

fn env_number<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv(name, raw)),
        Err(_) => Ok(None),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidEnv(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidEnv(name, value) => {
                write!(f, "Invalid value for {}: '{}'", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
