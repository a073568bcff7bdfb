//! Uploading content to the board with progress reporting.
//!
//! `POST /upload` takes a multipart form with `hash`, `type` and either a
//! `text` field or a streamed `file` part. File bodies are streamed in
//! [`CHUNK_SIZE`] pieces and progress is reported as the transport pulls them.
//! Progress never reaches 1.0 before the server has answered.

use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use reqwest::multipart::{Form, Part};

use crate::content_hash::Content;
use crate::http::HttpClient;
use crate::item::Item;
use crate::sync::SyncError;

/// Highest progress reported before the server confirms the upload.
pub const PROGRESS_CEILING: f64 = 0.999;
pub const CHUNK_SIZE: usize = 64 * 1024;

pub type ProgressFn = Box<dyn FnMut(f64) + Send>;

/// Something that can put content on the board.
pub trait UploadChannel: Send + Sync + 'static {
    /// Uploads `content` and returns the server's item for it.
    ///
    /// `on_progress` sees non-decreasing values below 1.0 while the transfer
    /// runs, then exactly one 1.0 on success. It is not called after a
    /// failure.
    fn upload(
        &self,
        content: Content,
        on_progress: ProgressFn,
    ) -> BoxFuture<'static, Result<Item, SyncError>>;
}

struct ProgressState {
    callback: ProgressFn,
    last: Option<f64>,
    finished: bool,
}

/// Enforces the progress contract around a raw callback.
#[derive(Clone)]
pub struct ProgressTracker {
    state: Arc<Mutex<ProgressState>>,
}

impl ProgressTracker {
    pub fn new(callback: ProgressFn) -> Self {
        Self {
            state: Arc::new(Mutex::new(ProgressState {
                callback,
                last: None,
                finished: false,
            })),
        }
    }

    /// Reports `sent` of `total` bytes.
    pub fn report(&self, sent: u64, total: u64) {
        let fraction = if total == 0 {
            0.0
        } else {
            sent as f64 / total as f64
        };
        let fraction = fraction.clamp(0.0, PROGRESS_CEILING);

        self.with_state(|state| {
            if state.finished || state.last.is_some_and(|last| fraction <= last) {
                return;
            }
            state.last = Some(fraction);
            (state.callback)(fraction);
        });
    }

    pub fn complete(&self) {
        self.with_state(|state| {
            if state.finished {
                return;
            }
            state.finished = true;
            (state.callback)(1.0);
        });
    }

    /// Silences the callback for good.
    pub fn fail(&self) {
        self.with_state(|state| state.finished = true);
    }

    fn with_state(&self, f: impl FnOnce(&mut ProgressState)) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state);
    }
}

/// Uploads over the board server's HTTP interface.
#[derive(Debug, Clone)]
pub struct HttpUploader {
    http: HttpClient,
}

impl HttpUploader {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    pub async fn upload(
        &self,
        content: &Content,
        on_progress: impl FnMut(f64) + Send + 'static,
    ) -> Result<Item, SyncError> {
        let progress = ProgressTracker::new(Box::new(on_progress));
        match self.send(content, &progress).await {
            Ok(item) => {
                progress.complete();
                Ok(item)
            }
            Err(e) => {
                progress.fail();
                Err(e)
            }
        }
    }

    async fn send(&self, content: &Content, progress: &ProgressTracker) -> Result<Item, SyncError> {
        let hash = content.hash();
        let total = content.len();
        tracing::debug!("Uploading {} ({} bytes)", hash.short(), total);

        let form = Form::new()
            .text("hash", hash.to_string())
            .text("type", content.kind().to_string());

        let form = match content {
            Content::Text(text) => form.text("text", text.clone()),
            Content::File { name, bytes } => {
                let part = Part::stream_with_length(streamed_body(bytes, progress.clone()), total)
                    .file_name(name.clone());
                form.part("file", part)
            }
        };

        progress.report(0, total);

        let url = self.http.build_http_url("/upload");
        let response = self
            .http
            .client()
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SyncError::UploadError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::UploadError(if body.is_empty() {
                format!("Server returned status {}", status)
            } else {
                format!("Server returned status {}: {}", status, body)
            }));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SyncError::UploadError(e.to_string()))?;
        let item: Item = serde_json::from_str(&body)?;

        if item.hash != hash {
            return Err(SyncError::HashMismatch {
                local: hash,
                server: item.hash,
            });
        }

        Ok(item)
    }
}

impl UploadChannel for HttpUploader {
    fn upload(
        &self,
        content: Content,
        on_progress: ProgressFn,
    ) -> BoxFuture<'static, Result<Item, SyncError>> {
        let uploader = self.clone();
        async move { HttpUploader::upload(&uploader, &content, on_progress).await }.boxed()
    }
}

/// A request body that reports progress as chunks are pulled.
fn streamed_body(bytes: &[u8], progress: ProgressTracker) -> reqwest::Body {
    let total = bytes.len() as u64;
    let chunks: Vec<Vec<u8>> = bytes.chunks(CHUNK_SIZE).map(<[u8]>::to_vec).collect();

    let mut sent = 0u64;
    let stream = futures::stream::iter(chunks).map(move |chunk| {
        sent += chunk.len() as u64;
        progress.report(sent, total);
        Ok::<_, std::io::Error>(chunk)
    });

    reqwest::Body::wrap_stream(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording() -> (ProgressTracker, Arc<Mutex<Vec<f64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let tracker = ProgressTracker::new(Box::new(move |p| sink.lock().unwrap().push(p)));
        (tracker, seen)
    }

    #[test]
    fn test_progress_clamped_until_complete() {
        let (tracker, seen) = recording();

        tracker.report(0, 100);
        tracker.report(50, 100);
        tracker.report(100, 100);
        tracker.complete();

        assert_eq!(*seen.lock().unwrap(), vec![0.0, 0.5, PROGRESS_CEILING, 1.0]);
    }

    #[test]
    fn test_progress_is_non_decreasing() {
        let (tracker, seen) = recording();

        tracker.report(60, 100);
        tracker.report(30, 100);
        tracker.report(60, 100);
        tracker.report(70, 100);

        assert_eq!(*seen.lock().unwrap(), vec![0.6, 0.7]);
    }

    #[test]
    fn test_no_progress_after_failure() {
        let (tracker, seen) = recording();

        tracker.report(10, 100);
        tracker.fail();
        tracker.report(90, 100);
        tracker.complete();

        assert_eq!(*seen.lock().unwrap(), vec![0.1]);
    }

    #[test]
    fn test_complete_reported_once() {
        let (tracker, seen) = recording();
        tracker.complete();
        tracker.complete();
        tracker.report(100, 100);
        assert_eq!(*seen.lock().unwrap(), vec![1.0]);
    }

    #[test]
    fn test_empty_content_progress() {
        let (tracker, seen) = recording();
        tracker.report(0, 0);
        tracker.complete();
        assert_eq!(*seen.lock().unwrap(), vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_upload_to_unreachable_server_fails_silently() {
        let uploader = HttpUploader::new(HttpClient::new("http://127.0.0.1:1"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let result = uploader
            .upload(&Content::Text("hello".to_string()), move |p| {
                sink.lock().unwrap().push(p)
            })
            .await;

        assert!(matches!(result, Err(SyncError::UploadError(_))));
        assert!(seen.lock().unwrap().iter().all(|p| *p < 1.0));
    }
}
