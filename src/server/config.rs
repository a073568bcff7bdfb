/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Port to listen on; also the advertised push port
    pub port: u16,
    /// Host name clients should use for the push endpoint
    pub public_host: String,
    /// Largest accepted upload, in megabytes
    pub max_upload_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            public_host: "localhost".to_string(),
            max_upload_mb: 512,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = std::env::var("CLIPSHARE_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);

        let public_host = std::env::var("CLIPSHARE_PUBLIC_HOST").unwrap_or(defaults.public_host);

        let max_upload_mb = std::env::var("CLIPSHARE_MAX_UPLOAD_MB")
            .ok()
            .and_then(|m| m.parse().ok())
            .unwrap_or(defaults.max_upload_mb);

        Self {
            port,
            public_host,
            max_upload_mb,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}
