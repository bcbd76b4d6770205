//! Binance spot WebSocket message types
//!
//! Raw streams deliver the event object directly. Combined streams
//! (`/stream?streams=...`) wrap it as `{"stream": "...", "data": {...}}`.

use serde::Deserialize;
use stockmq_schema::PriceLevel;

pub const EVENT_KLINE: &str = "kline";
pub const EVENT_DEPTH_UPDATE: &str = "depthUpdate";

/// Just enough of any message to decide what it is
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceEnvelope {
    #[serde(rename = "e")]
    pub event_type: Option<String>,
    #[serde(rename = "E")]
    pub event_time: Option<i64>,
    pub id: Option<serde_json::Value>,
    pub code: Option<i64>,
}

/// Error reply, e.g. `{"code": 2, "msg": "Invalid request", "id": 1}`
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceError {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
}

/// Candlestick update
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceKlineEvent {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "k")]
    pub kline: BinanceKline,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceKline {
    /// Kline start time (ms)
    #[serde(rename = "t")]
    pub start_time: i64,
    #[serde(rename = "i")]
    pub interval: String,
    #[serde(rename = "o")]
    pub open: String,
    #[serde(rename = "h")]
    pub high: String,
    #[serde(rename = "l")]
    pub low: String,
    #[serde(rename = "c")]
    pub close: String,
    #[serde(rename = "v")]
    pub volume: String,
    #[serde(rename = "x", default)]
    pub is_final: bool,
}

/// Diff. depth stream update
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceDepthUpdate {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "b", default)]
    pub bids: Vec<PriceLevel>,
    #[serde(rename = "a", default)]
    pub asks: Vec<PriceLevel>,
}
