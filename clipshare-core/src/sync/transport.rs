//! Transport abstraction for the push channel.
//!
//! The channel state machine only needs "open a connection" and, once open, a
//! sink and a stream of text frames. [`Connector`] captures exactly that so the
//! state machine can run against a WebSocket in production and against an
//! in-memory pipe in tests.

use std::pin::Pin;

use futures::future::{self, BoxFuture};
use futures::stream::BoxStream;
use futures::{FutureExt, Sink, SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::error::SyncError;

pub type FrameSink = Pin<Box<dyn Sink<String, Error = SyncError> + Send>>;
pub type FrameStream = BoxStream<'static, Result<String, SyncError>>;

/// An open transport: outgoing and incoming text frames.
///
/// The stream ending (or yielding an error) means the transport closed.
pub struct Connection {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens transports to a fixed endpoint.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self) -> BoxFuture<'static, Result<Connection, SyncError>>;
}

/// Connector for the board server's WebSocket endpoint.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Connector for WebSocketConnector {
    fn connect(&self) -> BoxFuture<'static, Result<Connection, SyncError>> {
        let url = self.url.clone();
        async move {
            let (ws_stream, _) = connect_async(&url)
                .await
                .map_err(|e| SyncError::ConnectionError(e.to_string()))?;

            let (sender, receiver) = ws_stream.split();

            let sink = sender
                .sink_map_err(|e| SyncError::WebSocketError(e.to_string()))
                .with(|frame: String| future::ready(Ok::<_, SyncError>(Message::Text(frame.into()))));

            let stream = receiver.filter_map(|message| {
                future::ready(match message {
                    Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                    // Invalid UTF-8 fails to decode later and is dropped there
                    Ok(Message::Binary(data)) => {
                        Some(Ok(String::from_utf8_lossy(&data).into_owned()))
                    }
                    // Pings are answered by tungstenite on the next write
                    Ok(_) => None,
                    Err(e) => Some(Err(SyncError::WebSocketError(e.to_string()))),
                })
            });

            Ok(Connection {
                sink: Box::pin(sink),
                stream: stream.boxed(),
            })
        }
        .boxed()
    }
}
