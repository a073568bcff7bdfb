//! Sync error types.

use thiserror::Error;

use crate::content_hash::ContentHash;

/// Errors that can occur during sync client operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Failed to connect to server
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Opening the push channel took too long
    #[error("Connection timed out")]
    ConnectTimeout,

    /// WebSocket error on an open connection
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Malformed frame, schema violation or server-reported error
    #[error("Sync protocol error: {0}")]
    ProtocolError(String),

    /// HTTP request failed or returned a non-success status
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Upload failed
    #[error("Upload failed: {0}")]
    UploadError(String),

    /// Server stored the upload under a different hash than we computed
    #[error("Content hash mismatch: computed {local}, server returned {server}")]
    HashMismatch {
        local: ContentHash,
        server: ContentHash,
    },
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::ProtocolError(e.to_string())
    }
}
