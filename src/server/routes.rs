//! HTTP routes of the board server.
//!
//! - `GET /health`: health check
//! - `GET /getSocketInfo`: where the push endpoint lives
//! - `POST /upload`: multipart upload of text or a file
//! - `GET /files/{hash}`: download a stored file
//! - `GET /`: WebSocket push endpoint

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use clipshare_core::{Content, ContentHash, ContentHasher, Item, Payload, ProtocolMessage};
use serde::Serialize;
use tokio::sync::RwLock;

use super::config::ServerConfig;
use super::hub::BoardHub;
use super::store::{BoardStore, Stored};
use super::ws;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RwLock<BoardStore>>,
    pub hub: Arc<BoardHub>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            store: Arc::new(RwLock::new(BoardStore::new())),
            hub: Arc::new(BoardHub::new()),
            config: Arc::new(config),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes();

    Router::new()
        .route("/", get(ws::upgrade))
        .route("/health", get(health))
        .route("/getSocketInfo", get(socket_info))
        .route("/upload", post(upload))
        .route("/files/{hash}", get(download))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Error response
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: "bad_request",
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error: "not_found",
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.error,
                message: self.message,
            }),
        )
            .into_response()
    }
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Socket discovery response
#[derive(Serialize)]
struct SocketInfoResponse {
    #[serde(rename = "socketURL")]
    socket_url: String,
    #[serde(rename = "socketPORT")]
    socket_port: u16,
    version: &'static str,
}

async fn socket_info(State(state): State<AppState>) -> Json<SocketInfoResponse> {
    Json(SocketInfoResponse {
        socket_url: state.config.public_host.clone(),
        socket_port: state.config.port,
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Fields of an upload form.
#[derive(Default)]
struct UploadForm {
    hash: Option<String>,
    kind: Option<String>,
    text: Option<String>,
    file: Option<(String, Vec<u8>)>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(e.to_string()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "hash" => form.hash = Some(field_text(field).await?),
                "type" => form.kind = Some(field_text(field).await?),
                "text" => form.text = Some(field_text(field).await?),
                "file" => {
                    let file_name = field.file_name().unwrap_or("upload.bin").to_string();
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::bad_request(e.to_string()))?;
                    form.file = Some((file_name, bytes.to_vec()));
                }
                other => tracing::debug!("Ignoring upload field {}", other),
            }
        }

        Ok(form)
    }

    /// The uploaded content, checked against the declared type.
    fn content(self) -> Result<(Option<String>, Content), ApiError> {
        let content = match (self.text, self.file) {
            (Some(text), None) => Content::Text(text),
            (None, Some((name, bytes))) => Content::File { name, bytes },
            (Some(_), Some(_)) => {
                return Err(ApiError::bad_request("Send either text or a file, not both"))
            }
            (None, None) => return Err(ApiError::bad_request("Upload carries no content")),
        };

        if let Some(kind) = &self.kind {
            if *kind != content.kind().to_string() {
                return Err(ApiError::bad_request(format!(
                    "Declared type '{}' does not match the content",
                    kind
                )));
            }
        }

        Ok((self.hash, content))
    }
}

async fn field_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))
}

async fn upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Item>, ApiError> {
    let (declared, content) = UploadForm::read(multipart).await?.content()?;

    let mut hasher = ContentHasher::new(content.kind());
    hasher.update(content.bytes());
    let hash = hasher.finalize();

    if let Some(declared) = declared {
        if declared != hash.as_str() {
            return Err(ApiError::bad_request(format!(
                "Declared hash {} does not match content hash {}",
                declared, hash
            )));
        }
    }

    let size = content.len();
    let stored = {
        let mut store = state.store.write().await;
        match content {
            Content::Text(text) => {
                store.insert_with(&hash, None, |ts| Item::text(hash.clone(), ts, text))
            }
            Content::File { name, bytes } => {
                let url = format!("/files/{}", hash);
                let hash_name = stored_name(&hash, &name);
                store.insert_with(&hash, Some(bytes), |ts| Item {
                    hash: hash.clone(),
                    timestamp: ts,
                    size,
                    payload: Payload::File {
                        url,
                        file_name: Some(name),
                        hash_name: Some(hash_name),
                    },
                })
            }
        }
    };

    match &stored {
        Stored::New(item) => {
            tracing::info!("Stored {} {} ({} bytes)", item.kind(), hash.short(), size);
            state.hub.broadcast(ProtocolMessage::add(item.clone()));
        }
        Stored::Existing(_) => {
            tracing::debug!("{} already stored", hash.short());
        }
    }

    Ok(Json(stored.into_item()))
}

/// Hash plus the original extension, e.g. `3fa9....pdf`.
fn stored_name(hash: &ContentHash, file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => format!("{}.{}", hash, ext),
        _ => hash.to_string(),
    }
}

async fn download(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Response, ApiError> {
    let hash: ContentHash = hash
        .parse()
        .map_err(|e: clipshare_core::ContentHashError| ApiError::bad_request(e.to_string()))?;

    let store = state.store.read().await;
    let (body, item) = store
        .file(&hash)
        .ok_or_else(|| ApiError::not_found(format!("No file {}", hash.short())))?;

    let file_name = match &item.payload {
        Payload::File { file_name, .. } => file_name.clone(),
        Payload::Text(_) => None,
    }
    .unwrap_or_else(|| hash.to_string());

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name.replace('"', "")),
            ),
        ],
        Body::from(body.to_vec()),
    )
        .into_response())
}
