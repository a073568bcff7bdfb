//! Keeping a client's board in step with the server.
//!
//! ## Protocol
//!
//! The server pushes JSON text frames over a single WebSocket:
//! 1. On connect the server sends `full` with the complete board
//! 2. Uploads are broadcast as `add`, removals as `delete`
//! 3. Clients send `delete` to remove an item and `refresh` to ask for `full`
//! 4. Either side may send `heartBeat`; it carries no state

mod channel;
mod coordinator;
mod error;
mod protocol;
mod session;
#[cfg(test)]
mod testing;
mod transport;

pub use channel::{
    ChannelConfig, ChannelEvent, ConnectionState, SyncChannel, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_INTERVAL,
};
pub use coordinator::{Applied, CollectionEvent, SyncCoordinator, UploadTicket};
pub use error::SyncError;
pub use protocol::{AddData, DeleteData, FullData, ProtocolMessage};
pub use session::{Intent, RenderSink, SyncSession, SERVER_UNREACHABLE};
pub use transport::{Connection, Connector, FrameSink, FrameStream, WebSocketConnector};
