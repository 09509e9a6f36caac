use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::TransportError;
use super::broker::{Consumer, Publisher};

/// Creates a bounded in-process queue.
///
/// Publishing waits while the queue is full. The queue closes once every
/// [`MemoryPublisher`] clone has been dropped.
pub fn queue(capacity: usize) -> (MemoryPublisher, MemoryConsumer) {
    let (tx, rx) = mpsc::channel(capacity);
    (MemoryPublisher(tx), MemoryConsumer(rx))
}

#[derive(Clone)]
pub struct MemoryPublisher(mpsc::Sender<Bytes>);

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&self, body: Bytes) -> Result<(), TransportError> {
        self.0.send(body).await.map_err(|_| TransportError::Closed)
    }
}

pub struct MemoryConsumer(mpsc::Receiver<Bytes>);

impl MemoryConsumer {
    /// Stops accepting new messages; already queued ones can still be consumed.
    pub fn close(&mut self) {
        self.0.close();
    }

    /// Number of messages waiting in the queue.
    pub fn pending(&self) -> usize {
        self.0.len()
    }
}

#[async_trait]
impl Consumer for MemoryConsumer {
    async fn consume(&mut self) -> Option<Bytes> {
        self.0.recv().await
    }
}
