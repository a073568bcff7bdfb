//! The push channel and its reconnection state machine.
//!
//! A [`SyncChannel`] owns one background task. The task owns the live
//! transport, the retry counter and every timer (connect timeout, backoff,
//! heartbeat), so nothing outlives the channel and a superseded transport is
//! simply dropped.
//!
//! ```text
//! connecting ──open──► open ──close──► closed-retrying ──backoff──► connecting
//!      │                                     ▲      │
//!      └──────────failed open────────────────┘      └──backoff, attempts exhausted──► closed-final
//! ```
//!
//! State changes and decoded messages are delivered, in transport order, on a
//! single event stream.

use std::fmt;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use super::error::SyncError;
use super::protocol::ProtocolMessage;
use super::transport::{Connection, Connector, FrameSink};

/// Default number of reconnect attempts before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 3;
/// Fixed delay between reconnect attempts.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(3000);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connecting,
    Open,
    ClosedRetrying,
    ClosedFinal,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::ClosedRetrying => write!(f, "closed-retrying"),
            ConnectionState::ClosedFinal => write!(f, "closed-final"),
        }
    }
}

/// Push channel settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Reconnect attempts after a lost or failed connection before giving up
    pub max_reconnect_attempts: u32,
    /// Delay before each reconnect attempt (no exponential growth)
    pub reconnect_interval: Duration,
    /// Time allowed for a single open; `None` waits for the transport
    pub connect_timeout: Option<Duration>,
    /// Period of protocol heartbeats while open; `None` disables them
    pub heartbeat_interval: Option<Duration>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            heartbeat_interval: Some(DEFAULT_HEARTBEAT_INTERVAL),
        }
    }
}

/// What the channel reports to its subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    StateChanged(ConnectionState),
    Message(ProtocolMessage),
}

#[derive(Debug)]
enum Command {
    Send(ProtocolMessage),
    Shutdown,
}

/// Handle to a running push channel.
///
/// Dropping the handle stops the channel task.
#[derive(Debug)]
pub struct SyncChannel {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    task: Option<JoinHandle<()>>,
}

impl SyncChannel {
    /// Starts the state machine in `connecting` and returns the handle plus
    /// the event stream.
    pub fn spawn<C: Connector>(
        connector: C,
        config: ChannelConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        let task = ChannelTask {
            connector,
            config,
            state: state_tx,
            events: event_tx,
            commands: command_rx,
            attempts: 0,
        };

        let handle = tokio::spawn(task.run());

        (
            Self {
                commands: command_tx,
                state: state_rx,
                task: Some(handle),
            },
            event_rx,
        )
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Watch connection state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Best-effort send.
    ///
    /// Returns `false` when the message was dropped because the channel is
    /// not open. Nothing is queued for later delivery.
    pub fn send(&self, message: ProtocolMessage) -> bool {
        if !self.is_open() {
            tracing::debug!(
                "Dropping outgoing {} message: channel is {}",
                message.action(),
                self.state()
            );
            return false;
        }
        self.commands.send(Command::Send(message)).is_ok()
    }

    /// Closes the live transport and stops the state machine.
    pub async fn shutdown(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

enum Opened {
    Connected(Connection),
    Failed(SyncError),
    Shutdown,
}

enum Closed {
    Lost,
    Shutdown,
}

struct ChannelTask<C> {
    connector: C,
    config: ChannelConfig,
    state: watch::Sender<ConnectionState>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
    attempts: u32,
}

impl<C: Connector> ChannelTask<C> {
    async fn run(mut self) {
        loop {
            self.transition(ConnectionState::Connecting);

            match self.open().await {
                Opened::Connected(connection) => {
                    self.attempts = 0;
                    self.transition(ConnectionState::Open);
                    if let Closed::Shutdown = self.pump(connection).await {
                        break;
                    }
                }
                Opened::Failed(e) => {
                    tracing::warn!("Failed to open push channel: {}", e);
                }
                Opened::Shutdown => break,
            }

            self.transition(ConnectionState::ClosedRetrying);
            if !self.backoff().await {
                break;
            }

            if self.attempts >= self.config.max_reconnect_attempts {
                tracing::warn!(
                    "Server unreachable after {} reconnect attempts",
                    self.attempts
                );
                self.transition(ConnectionState::ClosedFinal);
                return;
            }
            self.attempts += 1;
        }

        // Stopped on request: terminal, but not worth a notice
        self.state.send_replace(ConnectionState::ClosedFinal);
    }

    fn transition(&mut self, state: ConnectionState) {
        tracing::info!(
            "Push channel {} (reconnect attempt {})",
            state,
            self.attempts
        );
        self.state.send_replace(state);
        let _ = self.events.send(ChannelEvent::StateChanged(state));
    }

    /// Opens a transport while dropping sends and watching for shutdown.
    async fn open(&mut self) -> Opened {
        let connect = self.connector.connect();
        let connect_timeout = self.config.connect_timeout;
        let connect = async move {
            match connect_timeout {
                Some(limit) => tokio::time::timeout(limit, connect)
                    .await
                    .unwrap_or(Err(SyncError::ConnectTimeout)),
                None => connect.await,
            }
        };
        tokio::pin!(connect);

        loop {
            tokio::select! {
                result = &mut connect => {
                    return match result {
                        Ok(connection) => Opened::Connected(connection),
                        Err(e) => Opened::Failed(e),
                    };
                }
                command = self.commands.recv() => match command {
                    Some(Command::Send(message)) => drop_unsent(&message),
                    Some(Command::Shutdown) | None => return Opened::Shutdown,
                },
            }
        }
    }

    /// Moves frames until the transport closes or shutdown is requested.
    async fn pump(&mut self, connection: Connection) -> Closed {
        let Connection {
            mut sink,
            mut stream,
        } = connection;

        let mut heartbeat = self.config.heartbeat_interval.map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(text)) => {
                        if !self.deliver(&text) {
                            let _ = sink.close().await;
                            return Closed::Shutdown;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!("Push channel transport error: {}", e);
                        return Closed::Lost;
                    }
                    None => {
                        tracing::info!("Push channel closed by server");
                        return Closed::Lost;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(Command::Send(message)) => {
                        if let Err(e) = write(&mut sink, &message).await {
                            tracing::warn!("Failed to send {} message: {}", message.action(), e);
                            return Closed::Lost;
                        }
                    }
                    Some(Command::Shutdown) | None => {
                        let _ = sink.close().await;
                        return Closed::Shutdown;
                    }
                },
                _ = tick(&mut heartbeat) => {
                    if let Err(e) = write(&mut sink, &ProtocolMessage::heartbeat()).await {
                        tracing::warn!("Failed to send heartbeat: {}", e);
                        return Closed::Lost;
                    }
                }
            }
        }
    }

    /// Parses and forwards one inbound frame.
    ///
    /// Returns `false` once nobody is listening any more.
    fn deliver(&mut self, frame: &str) -> bool {
        match ProtocolMessage::decode(frame) {
            Ok(message) => {
                tracing::debug!("Received {} message", message.action());
                self.events.send(ChannelEvent::Message(message)).is_ok()
            }
            Err(e) => {
                tracing::warn!("Dropping malformed frame: {}", e);
                true
            }
        }
    }

    /// Waits out the reconnect delay. Returns `false` on shutdown.
    async fn backoff(&mut self) -> bool {
        let delay = tokio::time::sleep(self.config.reconnect_interval);
        tokio::pin!(delay);

        loop {
            tokio::select! {
                _ = &mut delay => return true,
                command = self.commands.recv() => match command {
                    Some(Command::Send(message)) => drop_unsent(&message),
                    Some(Command::Shutdown) | None => return false,
                },
            }
        }
    }
}

async fn write(sink: &mut FrameSink, message: &ProtocolMessage) -> Result<(), SyncError> {
    let frame = message.encode()?;
    sink.send(frame).await
}

async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => futures::future::pending().await,
    }
}

fn drop_unsent(message: &ProtocolMessage) {
    tracing::debug!(
        "Dropping outgoing {} message: channel not open",
        message.action()
    );
}
