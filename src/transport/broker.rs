use async_trait::async_trait;
use bytes::Bytes;

use super::TransportError;

/// Write side of a message queue.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, body: Bytes) -> Result<(), TransportError>;
}

/// Read side of a message queue.
#[async_trait]
pub trait Consumer: Send {
    /// Waits for the next message. `None` once the queue is closed and drained.
    async fn consume(&mut self) -> Option<Bytes>;
}
