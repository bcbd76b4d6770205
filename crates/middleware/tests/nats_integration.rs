//! Integration tests for NATS transport
//!
//! Run with: cargo test -p stockmq-middleware --test nats_integration -- --ignored
//! Requires: docker run -p 4222:4222 nats:latest

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use stockmq_middleware::{ClientError, Connect, NatsTransport, ResilientClient, Shutdown, Transport};

#[tokio::test]
#[ignore]
async fn test_nats_publish_subscribe_roundtrip() {
    let transport = NatsTransport::connect("nats://localhost:4222", "stockmq-it")
        .await
        .expect("Failed to connect to NATS");

    let mut sub = transport
        .subscribe("C.1m.BTCUSDT.binance")
        .await
        .expect("Failed to subscribe");

    transport
        .publish("C.1m.BTCUSDT.binance", Bytes::from("test message"))
        .await
        .expect("Failed to publish");

    let msg = sub.next().await.expect("Failed to receive");
    assert_eq!(msg.payload, Bytes::from("test message"));
}

struct NatsConnect;

#[async_trait]
impl Connect for NatsConnect {
    type Handle = NatsTransport;

    async fn connect(&self) -> Result<NatsTransport, ClientError> {
        Ok(NatsTransport::connect("nats://localhost:4222", "stockmq-it").await?)
    }

    fn is_healthy(&self, handle: &NatsTransport) -> bool {
        handle.is_connected()
    }
}

#[tokio::test]
#[ignore]
async fn test_resilient_nats_client_reconnects() {
    let client = Arc::new(ResilientClient::new(
        "nats",
        NatsConnect,
        Duration::from_millis(100),
        Shutdown::new(),
    ));
    client.connect().await.expect("Failed to connect to NATS");
    assert!(client.is_healthy().await);

    assert!(client.handle_error("forced"));
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(client.is_healthy().await);
    assert_eq!(client.reconnect_count(), 1);
}
