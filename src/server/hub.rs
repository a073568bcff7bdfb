//! Fan-out of board changes to connected clients.

use clipshare_core::ProtocolMessage;
use tokio::sync::broadcast;

/// Broadcast buffer; a client that falls further behind gets a fresh `full`
const HUB_CAPACITY: usize = 64;

/// Tracks all connected clients for broadcasting updates.
pub struct BoardHub {
    sender: broadcast::Sender<ProtocolMessage>,
}

impl BoardHub {
    /// Creates a new hub.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(HUB_CAPACITY);
        Self { sender }
    }

    /// Subscribes to board changes.
    pub fn subscribe(&self) -> broadcast::Receiver<ProtocolMessage> {
        self.sender.subscribe()
    }

    /// Broadcasts a change to every subscriber.
    pub fn broadcast(&self, message: ProtocolMessage) {
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(message);
    }

    pub fn client_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BoardHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipshare_core::ContentHash;

    #[tokio::test]
    async fn test_hub_subscribe_and_broadcast() {
        let hub = BoardHub::new();

        let mut rx1 = hub.subscribe();
        let mut rx2 = hub.subscribe();
        assert_eq!(hub.client_count(), 2);

        let message = ProtocolMessage::delete(ContentHash::of_text("x"));
        hub.broadcast(message.clone());

        assert_eq!(rx1.try_recv().unwrap(), message);
        assert_eq!(rx2.try_recv().unwrap(), message);
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers() {
        let hub = BoardHub::new();
        hub.broadcast(ProtocolMessage::refresh());
        assert_eq!(hub.client_count(), 0);
    }
}
