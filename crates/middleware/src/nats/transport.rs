use async_nats::connection::State;
use async_nats::{Client, ConnectOptions};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tracing::info;

use crate::error::TransportError;
use crate::latency::now_tsc;
use crate::transport::{Subscription, Transport, TransportMessage};

/// NATS subscription wrapper
struct NatsSubscription {
    subscriber: async_nats::Subscriber,
}

#[async_trait]
impl Subscription for NatsSubscription {
    async fn next(&mut self) -> Result<TransportMessage, TransportError> {
        let msg = self
            .subscriber
            .next()
            .await
            .ok_or(TransportError::Closed)?;

        Ok(TransportMessage {
            subject: msg.subject.to_string(),
            payload: msg.payload,
            timestamp: now_tsc(),
            sequence: None,
        })
    }

    async fn unsubscribe(mut self: Box<Self>) -> Result<(), TransportError> {
        self.subscriber
            .unsubscribe()
            .await
            .map_err(|e| TransportError::SubscribeFailed(e.to_string()))
    }
}

/// Core NATS transport. Events are published without JetStream so a missing
/// stream never blocks ingestion.
pub struct NatsTransport {
    client: Client,
}

impl NatsTransport {
    /// Wrap an existing client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect to a NATS server, identifying as `name`
    pub async fn connect(url: &str, name: &str) -> Result<Self, TransportError> {
        let client = ConnectOptions::new()
            .name(name)
            .connect(url)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        info!(url = %url, name = %name, "connected to NATS");
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Transport for NatsTransport {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), TransportError> {
        self.client
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| TransportError::PublishFailed(e.to_string()))
    }

    async fn subscribe(&self, subject: &str) -> Result<Box<dyn Subscription>, TransportError> {
        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| TransportError::SubscribeFailed(e.to_string()))?;
        Ok(Box::new(NatsSubscription { subscriber }))
    }

    async fn flush(&self) -> Result<(), TransportError> {
        self.client
            .flush()
            .await
            .map_err(|e| TransportError::PublishFailed(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        matches!(self.client.connection_state(), State::Connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Note: These tests require a running NATS server
    // Run: docker run -p 4222:4222 nats:latest

    #[tokio::test]
    #[ignore] // Requires NATS server
    async fn test_publish_succeeds() {
        let transport = NatsTransport::connect("nats://localhost:4222", "stockmq-test")
            .await
            .unwrap();
        assert!(transport.is_connected());
        let result = transport
            .publish("Q.BTCUSDT.test", Bytes::from("{}"))
            .await;
        assert!(result.is_ok());
        transport.flush().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let result = NatsTransport::connect("nats://127.0.0.1:1", "stockmq-test").await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
    }
}
