//! Clipshare Core Library
//!
//! Content addressing, the push channel and the sync logic shared by the
//! clipshare client and server.

pub mod content_hash;
pub mod http;
pub mod item;
pub mod notice;
pub mod pool;
pub mod sync;
pub mod upload;

pub use content_hash::{Content, ContentHash, ContentHashError, ContentHasher, HashPrefix};
pub use http::{HealthResponse, HttpClient, SocketInfo};
pub use item::{Item, ItemError, ItemKind, Payload};
pub use notice::{NoticeBoard, NoticeEvent, NoticeHandle, NoticePhase, NOTICE_FADE, NOTICE_HOLD};
pub use pool::{Poolable, ResourcePool};
pub use sync::{
    ChannelConfig, ConnectionState, Intent, ProtocolMessage, RenderSink, SyncChannel,
    SyncCoordinator, SyncError, SyncSession,
};
pub use upload::{HttpUploader, ProgressFn, ProgressTracker, UploadChannel, PROGRESS_CEILING};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
