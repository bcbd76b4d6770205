//! Document store: one JSONB row per event in PostgreSQL.

use std::sync::Arc;

use async_trait::async_trait;
use stockmq_metadata::DocumentStoreConfig;
use stockmq_middleware::{ClientError, Connect, ResilientClient, Shutdown};
use stockmq_schema::MarketEvent;
use tokio_postgres::{Client, NoTls};
use tracing::{error, info};

use super::Sink;
use crate::error::SinkError;
use crate::metrics;

pub const DOCUMENT_STORE_NAME: &str = "postgres";

/// Table names are validated as plain identifiers when the config is loaded.
pub struct DocumentConnect {
    url: String,
    bars_table: String,
    quotes_table: String,
}

impl DocumentConnect {
    fn create_table_sql(table: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (id BIGSERIAL PRIMARY KEY, doc JSONB NOT NULL, \
             inserted_at TIMESTAMPTZ NOT NULL DEFAULT now())",
            table
        )
    }
}

#[async_trait]
impl Connect for DocumentConnect {
    type Handle = Client;

    async fn connect(&self) -> Result<Client, ClientError> {
        let (client, connection) = tokio_postgres::connect(&self.url, NoTls)
            .await
            .map_err(|e| ClientError::Connect(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection error");
            }
        });

        for table in [&self.bars_table, &self.quotes_table] {
            client
                .batch_execute(&Self::create_table_sql(table))
                .await
                .map_err(|e| ClientError::Connect(e.to_string()))?;
        }
        info!(
            bars = %self.bars_table,
            quotes = %self.quotes_table,
            "document store tables ready"
        );
        Ok(client)
    }

    fn is_healthy(&self, handle: &Client) -> bool {
        !handle.is_closed()
    }
}

pub struct DocumentStore {
    client: Arc<ResilientClient<DocumentConnect>>,
    bars_insert: String,
    quotes_insert: String,
}

impl DocumentStore {
    pub fn new(config: &DocumentStoreConfig, shutdown: Shutdown) -> Self {
        let connect = DocumentConnect {
            url: config.url.clone(),
            bars_table: config.bars_table.clone(),
            quotes_table: config.quotes_table.clone(),
        };
        let client = ResilientClient::new(
            DOCUMENT_STORE_NAME,
            connect,
            config.retry_delay(),
            shutdown,
        )
        .with_reconnect_hook(metrics::inc_reconnect);

        Self {
            client: Arc::new(client),
            bars_insert: insert_sql(&config.bars_table),
            quotes_insert: insert_sql(&config.quotes_table),
        }
    }

    pub fn client(&self) -> &Arc<ResilientClient<DocumentConnect>> {
        &self.client
    }

    fn insert_for(&self, event: &MarketEvent) -> &str {
        match event {
            MarketEvent::Bar(_) => &self.bars_insert,
            MarketEvent::Quote(_) => &self.quotes_insert,
        }
    }
}

fn insert_sql(table: &str) -> String {
    format!("INSERT INTO {} (doc) VALUES ($1)", table)
}

#[async_trait]
impl Sink for DocumentStore {
    fn name(&self) -> &str {
        DOCUMENT_STORE_NAME
    }

    async fn start(&self) {
        let _ = self.client.connect().await;
    }

    async fn deliver(&self, event: &MarketEvent) -> Result<(), SinkError> {
        let client = self
            .client
            .handle()
            .await
            .ok_or_else(|| SinkError::Unavailable(DOCUMENT_STORE_NAME.to_string()))?;

        let doc = serde_json::to_value(event)?;
        if let Err(e) = client.execute(self.insert_for(event), &[&doc]).await {
            self.client.handle_error(&e);
            return Err(SinkError::Store(e.to_string()));
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
