//! Time-series store: InfluxDB v2 line protocol over the HTTP write API.
//!
//! Lines are buffered and written when the buffer reaches `batch_size`, on
//! every `flush_interval` tick, and once more on shutdown.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use stockmq_metadata::TimeSeriesConfig;
use stockmq_middleware::{ClientError, Connect, ResilientClient, Shutdown};
use stockmq_schema::{Bar, MarketEvent, PriceLevel, Quote};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::Sink;
use crate::error::SinkError;
use crate::metrics;

pub const TIMESERIES_STORE_NAME: &str = "influxdb";

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Live write endpoint
pub struct InfluxWriter {
    http: Client,
    write_url: String,
    token: String,
}

impl InfluxWriter {
    async fn write(&self, body: String) -> Result<(), SinkError> {
        let resp = self
            .http
            .post(&self.write_url)
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| SinkError::Store(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(SinkError::Store(format!("HTTP {}: {}", status, text)));
        }
        Ok(())
    }
}

pub struct InfluxConnect {
    http: Client,
    base_url: String,
    write_url: String,
    token: String,
}

impl InfluxConnect {
    fn new(config: &TimeSeriesConfig) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Connect(e.to_string()))?;

        let base_url = config.url.trim_end_matches('/').to_string();
        let mut write_url = url::Url::parse(&format!("{}/api/v2/write", base_url))
            .map_err(|e| ClientError::Connect(e.to_string()))?;
        write_url
            .query_pairs_mut()
            .append_pair("org", &config.organization)
            .append_pair("bucket", &config.bucket)
            .append_pair("precision", "us");

        Ok(Self {
            http,
            base_url,
            write_url: write_url.to_string(),
            token: config.token.clone(),
        })
    }
}

#[async_trait]
impl Connect for InfluxConnect {
    type Handle = InfluxWriter;

    async fn connect(&self) -> Result<InfluxWriter, ClientError> {
        let resp = self
            .http
            .get(format!("{}/ping", self.base_url))
            .send()
            .await
            .map_err(|e| ClientError::Connect(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ClientError::Connect(format!(
                "ping returned HTTP {}",
                resp.status()
            )));
        }

        Ok(InfluxWriter {
            http: self.http.clone(),
            write_url: self.write_url.clone(),
            token: self.token.clone(),
        })
    }
}

type Influx = Arc<ResilientClient<InfluxConnect>>;

pub struct TimeSeriesStore {
    client: Influx,
    buffer: Arc<Mutex<Vec<String>>>,
    batch_size: usize,
    flush_interval: Duration,
    shutdown: Shutdown,
}

impl TimeSeriesStore {
    pub fn new(config: &TimeSeriesConfig, shutdown: Shutdown) -> Result<Self, ClientError> {
        let client = ResilientClient::new(
            TIMESERIES_STORE_NAME,
            InfluxConnect::new(config)?,
            config.retry_delay(),
            shutdown.clone(),
        )
        .with_reconnect_hook(metrics::inc_reconnect);

        Ok(Self {
            client: Arc::new(client),
            buffer: Arc::new(Mutex::new(Vec::with_capacity(config.batch_size))),
            batch_size: config.batch_size.max(1),
            flush_interval: config.flush_interval().max(Duration::from_millis(1)),
            shutdown,
        })
    }

    pub fn client(&self) -> &Influx {
        &self.client
    }

    pub async fn buffered(&self) -> usize {
        self.buffer.lock().await.len()
    }
}

/// Drain the buffer and write it. Lines are dropped if the store is down.
async fn flush_buffer(client: &Influx, buffer: &Mutex<Vec<String>>) -> Result<(), SinkError> {
    let lines = std::mem::take(&mut *buffer.lock().await);
    if lines.is_empty() {
        return Ok(());
    }

    let Some(writer) = client.handle().await else {
        debug!(dropped = lines.len(), "influxdb unavailable, dropping buffered lines");
        return Err(SinkError::Unavailable(TIMESERIES_STORE_NAME.to_string()));
    };

    let count = lines.len();
    if let Err(e) = writer.write(lines.join("\n")).await {
        client.handle_error(&e);
        return Err(e);
    }
    debug!(lines = count, "flushed to influxdb");
    Ok(())
}

#[async_trait]
impl Sink for TimeSeriesStore {
    fn name(&self) -> &str {
        TIMESERIES_STORE_NAME
    }

    async fn start(&self) {
        let _ = self.client.connect().await;

        let client = Arc::clone(&self.client);
        let buffer = Arc::clone(&self.buffer);
        let shutdown = self.shutdown.clone();
        let period = self.flush_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = flush_buffer(&client, &buffer).await {
                            warn!(error = %e, "periodic influxdb flush failed");
                            metrics::inc_sink_error(TIMESERIES_STORE_NAME);
                        }
                    }
                }
            }
        });
    }

    async fn deliver(&self, event: &MarketEvent) -> Result<(), SinkError> {
        if self.client.handle().await.is_none() {
            return Err(SinkError::Unavailable(TIMESERIES_STORE_NAME.to_string()));
        }

        let full = {
            let mut buffer = self.buffer.lock().await;
            buffer.push(encode_line(event)?);
            buffer.len() >= self.batch_size
        };
        if full {
            flush_buffer(&self.client, &self.buffer).await?;
        }
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        self.client.is_healthy().await
    }

    async fn flush(&self) {
        if let Err(e) = flush_buffer(&self.client, &self.buffer).await {
            warn!(error = %e, "final influxdb flush failed");
        }
    }

    async fn close(&self) {
        self.client.close().await;
    }
}

/// One line-protocol record for an event
pub fn encode_line(event: &MarketEvent) -> Result<String, SinkError> {
    match event {
        MarketEvent::Bar(bar) => Ok(encode_bar(bar)),
        MarketEvent::Quote(quote) => encode_quote(quote),
    }
}

fn encode_bar(bar: &Bar) -> String {
    let h = &bar.header;
    let mut fields = vec![
        format!("time={}i", h.time),
        format!("time_srv={}i", h.time_srv),
        format!("time_rcv={}i", h.time_rcv),
    ];
    for (key, value) in [
        ("open", &bar.open),
        ("high", &bar.high),
        ("low", &bar.low),
        ("close", &bar.close),
        ("volume", &bar.volume),
    ] {
        match value.parse::<f64>() {
            Ok(v) if v.is_finite() => fields.push(format!("{}={}", key, float_field(v))),
            _ => debug!(field = key, value = %value, "skipping non-numeric candle field"),
        }
    }

    format!(
        "candle,interval={},source={},symbol={} {} {}",
        escape_tag(&bar.interval),
        escape_tag(&h.source),
        escape_tag(&h.symbol),
        fields.join(","),
        h.time_srv
    )
}

fn encode_quote(quote: &Quote) -> Result<String, SinkError> {
    let h = &quote.header;
    Ok(format!(
        "quote,source={},symbol={} time_srv={}i,time_rcv={}i,bids={},bids_depth={}i,asks={},asks_depth={}i {}",
        escape_tag(&h.source),
        escape_tag(&h.symbol),
        h.time_srv,
        h.time_rcv,
        string_field(&book_json(&quote.bids)?),
        quote.bids_depth,
        string_field(&book_json(&quote.asks)?),
        quote.asks_depth,
        h.time
    ))
}

fn book_json(levels: &[PriceLevel]) -> Result<String, SinkError> {
    Ok(serde_json::to_string(levels)?)
}

/// Floats always carry a decimal point so InfluxDB never reads them as integers
fn float_field(v: f64) -> String {
    let s = v.to_string();
    if s.contains(['.', 'e', 'E']) {
        s
    } else {
        format!("{}.0", s)
    }
}

fn escape_tag(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, ',' | '=' | ' ' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn string_field(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}
