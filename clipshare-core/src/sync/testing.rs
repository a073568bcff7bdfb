//! In-memory transport for driving the channel state machine in tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::channel::mpsc;
use futures::future::{self, BoxFuture};
use futures::{FutureExt, SinkExt, StreamExt};

use super::error::SyncError;
use super::protocol::ProtocolMessage;
use super::transport::{Connection, Connector};

/// The server end of an in-memory connection.
pub(crate) struct FakeServer {
    to_client: mpsc::UnboundedSender<Result<String, SyncError>>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl FakeServer {
    pub(crate) fn push(&self, frame: impl Into<String>) {
        let _ = self.to_client.unbounded_send(Ok(frame.into()));
    }

    pub(crate) fn push_message(&self, message: &ProtocolMessage) {
        self.push(message.encode().unwrap());
    }

    pub(crate) async fn next_frame(&mut self) -> Option<String> {
        self.from_client.next().await
    }

    pub(crate) async fn next_message(&mut self) -> Option<ProtocolMessage> {
        let frame = self.next_frame().await?;
        Some(ProtocolMessage::decode(&frame).unwrap())
    }

    /// Frames the client has sent so far, without waiting.
    pub(crate) fn drain_frames(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(Some(frame)) = self.from_client.try_next() {
            frames.push(frame);
        }
        frames
    }
}

pub(crate) fn pipe() -> (Connection, FakeServer) {
    let (to_client, client_rx) = mpsc::unbounded();
    let (client_tx, from_client) = mpsc::unbounded();

    let sink = client_tx.sink_map_err(|e| SyncError::WebSocketError(e.to_string()));

    (
        Connection {
            sink: Box::pin(sink),
            stream: client_rx.boxed(),
        },
        FakeServer {
            to_client,
            from_client,
        },
    )
}

/// Connector that replays a script of accepted and refused connections.
///
/// Once the script runs out every attempt is refused.
#[derive(Clone, Default)]
pub(crate) struct FakeConnector {
    script: Arc<Mutex<VecDeque<Option<Connection>>>>,
    attempts: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn accept(&self) -> FakeServer {
        let (connection, server) = pipe();
        self.script.lock().unwrap().push_back(Some(connection));
        server
    }

    pub(crate) fn refuse(&self) {
        self.script.lock().unwrap().push_back(None);
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Connector for FakeConnector {
    fn connect(&self) -> BoxFuture<'static, Result<Connection, SyncError>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front().flatten();
        future::ready(
            next.ok_or_else(|| SyncError::ConnectionError("connection refused".to_string())),
        )
        .boxed()
    }
}
