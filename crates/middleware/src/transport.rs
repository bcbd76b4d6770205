use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportError;

/// Message as seen by a subscriber
#[derive(Debug, Clone)]
pub struct TransportMessage {
    pub subject: String,
    pub payload: Bytes,
    /// TSC reading taken when the message was handed to the subscriber
    pub timestamp: u64,
    pub sequence: Option<u64>,
}

/// Subscription handle for receiving messages
#[async_trait]
pub trait Subscription: Send + Sync {
    /// Receive next message (blocks until available)
    async fn next(&mut self) -> Result<TransportMessage, TransportError>;

    /// Unsubscribe and close
    async fn unsubscribe(self: Box<Self>) -> Result<(), TransportError>;
}

/// Pub/sub bus the gateway publishes canonical events to
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish a message (fire and forget)
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), TransportError>;

    /// Subscribe to a subject
    async fn subscribe(&self, subject: &str) -> Result<Box<dyn Subscription>, TransportError>;

    /// Push out anything the client is still buffering
    async fn flush(&self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Whether the underlying connection is currently up
    fn is_connected(&self) -> bool {
        true
    }
}
