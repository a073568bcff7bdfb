//! HTTP side of the board server: socket discovery, health and downloads.

use serde::{Deserialize, Serialize};

use crate::sync::SyncError;

/// Where the push endpoint lives, as reported by `GET /getSocketInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketInfo {
    #[serde(rename = "socketURL")]
    pub socket_url: String,
    #[serde(rename = "socketPORT")]
    pub socket_port: u16,
    #[serde(default)]
    pub version: String,
}

impl SocketInfo {
    /// The WebSocket URL of the push endpoint.
    pub fn ws_url(&self) -> String {
        let host = self
            .socket_url
            .trim_start_matches("ws://")
            .trim_start_matches("wss://")
            .trim_start_matches("http://")
            .trim_start_matches("https://")
            .trim_end_matches('/');
        format!("ws://{}:{}/", host, self.socket_port)
    }
}

/// Response of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Plain HTTP client for the board server.
#[derive(Debug, Clone)]
pub struct HttpClient {
    server_url: String,
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Asks the server where its push endpoint is.
    pub async fn fetch_socket_info(&self) -> Result<SocketInfo, SyncError> {
        self.get_json("/getSocketInfo").await
    }

    /// Fast reachability check.
    pub async fn check_server(&self) -> Result<HealthResponse, SyncError> {
        self.get_json("/health").await
    }

    /// Fetches a file item's bytes. `url` may be absolute or server-relative.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, SyncError> {
        let url = self.resolve_url(url);
        tracing::debug!("Downloading {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SyncError::HttpError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SyncError::HttpError(format!(
                "Server returned status {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SyncError::HttpError(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, SyncError> {
        let url = self.build_http_url(path);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SyncError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SyncError::HttpError(format!(
                "Server returned status {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| SyncError::ProtocolError(e.to_string()))
    }

    /// Turns a server-relative URL into an absolute one.
    pub fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else if url.starts_with('/') {
            self.build_http_url(url)
        } else {
            self.build_http_url(&format!("/{}", url))
        }
    }

    /// Builds an HTTP URL for a given path.
    pub(crate) fn build_http_url(&self, path: &str) -> String {
        // Convert ws(s) to http(s) if needed
        let base_url = if self.server_url.starts_with("ws://") {
            self.server_url.replace("ws://", "http://")
        } else if self.server_url.starts_with("wss://") {
            self.server_url.replace("wss://", "https://")
        } else if !self.server_url.starts_with("http://")
            && !self.server_url.starts_with("https://")
        {
            format!("http://{}", self.server_url)
        } else {
            self.server_url.clone()
        };

        format!("{}{}", base_url.trim_end_matches('/'), path)
    }
}
