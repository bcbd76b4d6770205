//! Bus sink: canonical events as JSON on the NATS subject given by their
//! routing key.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use stockmq_metadata::NatsConfig;
use stockmq_middleware::{
    ClientError, Connect, NatsTransport, ResilientClient, Shutdown, Transport,
};
use stockmq_schema::MarketEvent;
use tracing::warn;

use super::Sink;
use crate::error::SinkError;
use crate::metrics;

pub const BUS_SINK_NAME: &str = "nats";

pub enum BusConnect {
    Nats { url: String, name: String },
    /// An already-open transport, reused on every reconnect
    Shared(Arc<dyn Transport>),
}

#[async_trait]
impl Connect for BusConnect {
    type Handle = Arc<dyn Transport>;

    async fn connect(&self) -> Result<Arc<dyn Transport>, ClientError> {
        match self {
            BusConnect::Nats { url, name } => {
                let transport = NatsTransport::connect(url, name).await?;
                Ok(Arc::new(transport))
            }
            BusConnect::Shared(transport) => Ok(Arc::clone(transport)),
        }
    }

    async fn close(&self, handle: Arc<Arc<dyn Transport>>) {
        if let Err(e) = handle.flush().await {
            warn!(error = %e, "flush on bus close failed");
        }
    }

    fn is_healthy(&self, handle: &Arc<dyn Transport>) -> bool {
        handle.is_connected()
    }
}

pub struct BusSink {
    client: Arc<ResilientClient<BusConnect>>,
}

impl BusSink {
    pub fn nats(config: &NatsConfig, shutdown: Shutdown) -> Self {
        let connect = BusConnect::Nats {
            url: config.url.clone(),
            name: config.name.clone(),
        };
        Self::with_connect(connect, config.retry_delay(), shutdown)
    }

    /// Bus over a caller-supplied transport, e.g. [`stockmq_middleware::InMemoryTransport`]
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        retry_delay: Duration,
        shutdown: Shutdown,
    ) -> Self {
        Self::with_connect(BusConnect::Shared(transport), retry_delay, shutdown)
    }

    fn with_connect(connect: BusConnect, retry_delay: Duration, shutdown: Shutdown) -> Self {
        let client = ResilientClient::new(BUS_SINK_NAME, connect, retry_delay, shutdown)
            .with_reconnect_hook(metrics::inc_reconnect);
        Self {
            client: Arc::new(client),
        }
    }

    pub fn client(&self) -> &Arc<ResilientClient<BusConnect>> {
        &self.client
    }
}

#[async_trait]
impl Sink for BusSink {
    fn name(&self) -> &str {
        BUS_SINK_NAME
    }

    async fn start(&self) {
        let _ = self.client.connect().await;
    }

    async fn deliver(&self, event: &MarketEvent) -> Result<(), SinkError> {
        let transport = self
            .client
            .handle()
            .await
            .ok_or_else(|| SinkError::Unavailable(BUS_SINK_NAME.to_string()))?;

        let payload = serde_json::to_vec(event)?;
        if let Err(e) = transport.publish(&event.routing_key(), Bytes::from(payload)).await {
            self.client.handle_error(&e);
            return Err(e.into());
        }
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        self.client.is_healthy().await
    }

    async fn close(&self) {
        self.client.close().await;
    }
}
