//! Tinkoff Invest streaming API message types
//!
//! Every message is `{"event": "...", "time": "<RFC 3339>", "payload": {...}}`
//! and the payload shape depends on `event`.

use serde::Deserialize;

pub const EVENT_CANDLE: &str = "candle";
pub const EVENT_ORDERBOOK: &str = "orderbook";
pub const EVENT_ERROR: &str = "error";

#[derive(Debug, Clone, Deserialize)]
pub struct TinkoffEnvelope {
    pub event: String,
    pub time: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TinkoffCandle {
    #[serde(rename = "o")]
    pub open: f64,
    #[serde(rename = "c")]
    pub close: f64,
    #[serde(rename = "h")]
    pub high: f64,
    #[serde(rename = "l")]
    pub low: f64,
    #[serde(rename = "v")]
    pub volume: i64,
    pub time: String,
    pub interval: String,
    pub figi: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TinkoffOrderBook {
    pub figi: String,
    pub depth: usize,
    /// `[price, quantity]` pairs
    #[serde(default)]
    pub bids: Vec<[f64; 2]>,
    #[serde(default)]
    pub asks: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TinkoffError {
    #[serde(default)]
    pub request_id: Option<String>,
    pub error: String,
}

/// Native interval name to the canonical one
pub fn canonical_interval(native: &str) -> Option<&'static str> {
    Some(match native {
        "1min" => "1m",
        "2min" => "2m",
        "3min" => "3m",
        "5min" => "5m",
        "10min" => "10m",
        "15min" => "15m",
        "30min" => "30m",
        "hour" => "1h",
        "2hour" => "2h",
        "4hour" => "4h",
        "day" => "1d",
        "week" => "1w",
        "month" => "1M",
        _ => return None,
    })
}
