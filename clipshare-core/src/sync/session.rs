//! One client's sync loop.
//!
//! [`SyncSession`] is the single control flow of a client. It owns the
//! coordinator, the push channel, the notice board and the in-flight uploads,
//! and handles channel events, upload results, user intents and notice expiry
//! one at a time. Everything the user should see goes through a
//! [`RenderSink`].

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::content_hash::{Content, ContentHash, HashPrefix};
use crate::http::HttpClient;
use crate::item::Item;
use crate::notice::{NoticeBoard, NoticeEvent};
use crate::upload::{HttpUploader, UploadChannel};

use super::channel::{ChannelConfig, ChannelEvent, ConnectionState, SyncChannel};
use super::coordinator::{Applied, CollectionEvent, SyncCoordinator, UploadTicket};
use super::error::SyncError;
use super::protocol::ProtocolMessage;
use super::transport::{Connector, WebSocketConnector};

pub const SERVER_UNREACHABLE: &str = "Server unreachable";

/// The rendering layer's side of the session.
pub trait RenderSink: Send + 'static {
    fn on_item_added(&mut self, item: &Item);
    fn on_item_updated(&mut self, item: &Item);
    fn on_item_removed(&mut self, hash: &ContentHash);
    fn on_connection_state_changed(&mut self, state: ConnectionState);
    /// `progress` is in [0, 1]; 1.0 only once the server has the content.
    fn on_upload_progress(&mut self, hash: &ContentHash, progress: f64);
    /// A notice appeared in `slot`. The slot stays taken until
    /// [`on_notice_expired`](Self::on_notice_expired) and is reused after.
    fn on_notice(&mut self, slot: u64, text: &str);
    fn on_notice_fading(&mut self, slot: u64);
    fn on_notice_expired(&mut self, slot: u64);
}

/// Something the user asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Share(Content),
    /// Delete the single item whose hash starts with the prefix.
    Delete(HashPrefix),
    Refresh,
    Shutdown,
}

#[derive(Debug)]
enum UploadEvent {
    Progress {
        hash: ContentHash,
        fraction: f64,
    },
    Finished {
        ticket: UploadTicket,
        hash: ContentHash,
        result: Result<Item, SyncError>,
    },
}

pub struct SyncSession<S> {
    coordinator: SyncCoordinator,
    channel: SyncChannel,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    uploader: Arc<dyn UploadChannel>,
    notices: NoticeBoard,
    sink: S,
    upload_tx: mpsc::UnboundedSender<UploadEvent>,
    upload_rx: mpsc::UnboundedReceiver<UploadEvent>,
    in_flight: HashSet<ContentHash>,
    tasks: JoinSet<()>,
    opened_before: bool,
}

impl<S: RenderSink> SyncSession<S> {
    pub fn new<C: Connector, U: UploadChannel>(
        connector: C,
        uploader: U,
        config: ChannelConfig,
        sink: S,
    ) -> Self {
        let (channel, events) = SyncChannel::spawn(connector, config);
        let (upload_tx, upload_rx) = mpsc::unbounded_channel();

        Self {
            coordinator: SyncCoordinator::new(),
            channel,
            events,
            uploader: Arc::new(uploader),
            notices: NoticeBoard::new(),
            sink,
            upload_tx,
            upload_rx,
            in_flight: HashSet::new(),
            tasks: JoinSet::new(),
            opened_before: false,
        }
    }

    /// Discovers the push endpoint of `server_url` and starts a session
    /// against it.
    pub async fn connect(
        server_url: &str,
        config: ChannelConfig,
        sink: S,
    ) -> Result<Self, SyncError> {
        let http = HttpClient::new(server_url);
        let info = http.fetch_socket_info().await?;
        let ws_url = info.ws_url();
        tracing::info!("Push endpoint is {} (server {})", ws_url, info.version);

        Ok(Self::new(
            WebSocketConnector::new(ws_url),
            HttpUploader::new(http),
            config,
            sink,
        ))
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    pub fn state(&self) -> ConnectionState {
        self.channel.state()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Runs until a [`Intent::Shutdown`], the intent sender is dropped, or the
    /// channel gives up.
    pub async fn run(&mut self, mut intents: mpsc::UnboundedReceiver<Intent>) {
        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.handle_channel_event(event),
                    None => break,
                },
                Some(event) = self.upload_rx.recv() => self.handle_upload_event(event),
                intent = intents.recv() => match intent {
                    Some(Intent::Shutdown) | None => break,
                    Some(intent) => self.handle_intent(intent),
                },
                Some(_) = self.tasks.join_next(), if !self.tasks.is_empty() => {}
                _ = notice_deadline(self.notices.next_deadline()) => {
                    let events = self.notices.expire(Instant::now());
                    self.render_notice_events(events);
                }
            }
        }

        self.stop().await;
    }

    async fn stop(&mut self) {
        self.channel.shutdown().await;
        self.tasks.abort_all();
        self.in_flight.clear();
        let events = self.notices.clear();
        self.render_notice_events(events);
    }

    fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::StateChanged(state) => {
                self.sink.on_connection_state_changed(state);
                match state {
                    ConnectionState::Open => {
                        // Anything may have happened while we were away
                        if self.opened_before {
                            self.channel.send(ProtocolMessage::refresh());
                        }
                        self.opened_before = true;
                    }
                    ConnectionState::ClosedFinal => self.notice(SERVER_UNREACHABLE),
                    ConnectionState::Connecting | ConnectionState::ClosedRetrying => {}
                }
            }
            ChannelEvent::Message(message) => {
                let applied = self.coordinator.apply_message(message);
                self.dispatch(applied);
            }
        }
    }

    fn handle_upload_event(&mut self, event: UploadEvent) {
        match event {
            UploadEvent::Progress { hash, fraction } => {
                self.sink.on_upload_progress(&hash, fraction);
            }
            UploadEvent::Finished {
                ticket,
                hash,
                result,
            } => {
                self.in_flight.remove(&hash);
                match result {
                    Ok(item) => {
                        let applied = self.coordinator.apply_local_upload(ticket, item);
                        self.dispatch(applied);
                    }
                    Err(e) => {
                        tracing::warn!("Upload of {} failed: {}", hash.short(), e);
                        self.coordinator.abandon_upload(ticket);
                        self.notice(&e.to_string());
                    }
                }
            }
        }
    }

    fn handle_intent(&mut self, intent: Intent) {
        match intent {
            Intent::Share(content) => self.share(content),
            Intent::Delete(prefix) => {
                let Some(hash) = self.resolve(&prefix) else {
                    return;
                };
                if !self.channel.send(ProtocolMessage::delete(hash)) {
                    self.notice("Not connected, delete was not sent");
                }
            }
            Intent::Refresh => {
                if !self.channel.send(ProtocolMessage::refresh()) {
                    self.notice("Not connected, refresh was not sent");
                }
            }
            Intent::Shutdown => {}
        }
    }

    /// Expands a prefix to the one board item it names. Unknown and
    /// ambiguous prefixes become a notice instead.
    fn resolve(&mut self, prefix: &HashPrefix) -> Option<ContentHash> {
        let matches: Vec<ContentHash> = self
            .coordinator
            .items()
            .filter(|item| prefix.matches(&item.hash))
            .map(|item| item.hash.clone())
            .collect();

        match matches.as_slice() {
            [hash] => Some(hash.clone()),
            [] => {
                self.notice(&format!("No item matches '{}'", prefix));
                None
            }
            many => {
                self.notice(&format!(
                    "'{}' matches {} items, use a longer prefix",
                    prefix,
                    many.len()
                ));
                None
            }
        }
    }

    fn share(&mut self, content: Content) {
        let hash = content.hash();

        if self.coordinator.contains(&hash) {
            tracing::debug!("{} is already on the board", hash.short());
            self.notice("Already on the board");
            return;
        }
        if !self.in_flight.insert(hash.clone()) {
            tracing::debug!("{} is already uploading", hash.short());
            return;
        }

        let ticket = self.coordinator.begin_upload();
        let uploader = self.uploader.clone();
        let done_tx = self.upload_tx.clone();
        let progress_tx = self.upload_tx.clone();
        let progress_hash = hash.clone();

        self.tasks.spawn(async move {
            let on_progress = Box::new(move |fraction| {
                let _ = progress_tx.send(UploadEvent::Progress {
                    hash: progress_hash.clone(),
                    fraction,
                });
            });
            let result = uploader.upload(content, on_progress).await;
            let _ = done_tx.send(UploadEvent::Finished {
                ticket,
                hash,
                result,
            });
        });
    }

    fn dispatch(&mut self, applied: Applied) {
        for event in &applied.events {
            match event {
                CollectionEvent::Added(item) => self.sink.on_item_added(item),
                CollectionEvent::Updated(item) => self.sink.on_item_updated(item),
                CollectionEvent::Removed(hash) => self.sink.on_item_removed(hash),
            }
        }
        if let Some(message) = applied.outgoing {
            self.channel.send(message);
        }
        if let Some(text) = applied.notice {
            self.notice(&text);
        }
    }

    fn notice(&mut self, text: &str) {
        let slot = self.notices.show(text, Instant::now());
        self.sink.on_notice(slot, text);
    }

    fn render_notice_events(&mut self, events: Vec<NoticeEvent>) {
        for event in events {
            match event {
                NoticeEvent::Fading(slot) => self.sink.on_notice_fading(slot),
                NoticeEvent::Expired(slot) => self.sink.on_notice_expired(slot),
            }
        }
    }
}

async fn notice_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => futures::future::pending().await,
    }
}
