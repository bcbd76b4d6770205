//! Tinkoff Invest streaming: `candle` becomes a bar, `orderbook` a quote.
//!
//! Prices arrive as JSON numbers and are rendered with the shortest decimal
//! string that round-trips to the same `f64`.

pub mod messages;

use chrono::DateTime;
use serde::Deserialize;
use stockmq_schema::{Bar, MarketEvent, MessageHeader, PriceLevel, Quote};
use tracing::{debug, error};

use super::ProtocolAdapter;
use crate::error::DecodeError;
use messages::{
    canonical_interval, TinkoffCandle, TinkoffEnvelope, TinkoffError, TinkoffOrderBook,
    EVENT_CANDLE, EVENT_ERROR, EVENT_ORDERBOOK,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TinkoffAdapter;

impl TinkoffAdapter {
    pub const ID: &'static str = "tinkoff";
}

fn parse_micros(ts: &str) -> Result<i64, DecodeError> {
    DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.timestamp_micros())
        .map_err(|e| DecodeError::InvalidTimestamp(format!("{}: {}", ts, e)))
}

fn decimal(value: f64) -> String {
    value.to_string()
}

fn levels(side: &[[f64; 2]], depth: usize) -> Vec<PriceLevel> {
    side.iter()
        .take(depth)
        .map(|[price, size]| PriceLevel::new(decimal(*price), decimal(*size)))
        .collect()
}

impl ProtocolAdapter for TinkoffAdapter {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn decode(
        &self,
        frame: &[u8],
        source: &str,
        received_at: i64,
    ) -> Result<Vec<MarketEvent>, DecodeError> {
        let envelope: TinkoffEnvelope = serde_json::from_slice(frame)?;

        match envelope.event.as_str() {
            EVENT_CANDLE => {
                let candle = TinkoffCandle::deserialize(&envelope.payload)?;
                let interval = canonical_interval(&candle.interval)
                    .ok_or_else(|| DecodeError::UnknownInterval(candle.interval.clone()))?;

                let bar = Bar {
                    header: MessageHeader {
                        symbol: candle.figi,
                        source: source.to_string(),
                        time: parse_micros(&candle.time)?,
                        time_srv: parse_micros(&envelope.time)?,
                        time_rcv: received_at,
                    },
                    interval: interval.to_string(),
                    open: decimal(candle.open),
                    high: decimal(candle.high),
                    low: decimal(candle.low),
                    close: decimal(candle.close),
                    volume: candle.volume.to_string(),
                };
                Ok(vec![bar.into()])
            }
            EVENT_ORDERBOOK => {
                let book = TinkoffOrderBook::deserialize(&envelope.payload)?;
                let time = parse_micros(&envelope.time)?;
                let header = MessageHeader {
                    symbol: book.figi,
                    source: source.to_string(),
                    time,
                    time_srv: time,
                    time_rcv: received_at,
                };
                let quote = Quote::new(
                    header,
                    levels(&book.bids, book.depth),
                    levels(&book.asks, book.depth),
                );
                Ok(vec![quote.into()])
            }
            EVENT_ERROR => {
                let err = TinkoffError::deserialize(&envelope.payload)?;
                error!(
                    source = %source,
                    request_id = ?err.request_id,
                    error = %err.error,
                    "tinkoff error"
                );
                Ok(Vec::new())
            }
            other => {
                debug!(source = %source, event = %other, "ignoring tinkoff event");
                Ok(Vec::new())
            }
        }
    }
}
