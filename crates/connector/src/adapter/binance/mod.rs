//! Binance spot market streams: `kline` becomes a bar, `depthUpdate` a quote.

pub mod messages;

use serde::Deserialize;
use serde_json::Value;
use stockmq_schema::{Bar, MarketEvent, MessageHeader, Quote};
use tracing::{debug, error};

use super::{canonical_interval, ProtocolAdapter};
use crate::error::DecodeError;
use messages::{
    BinanceDepthUpdate, BinanceEnvelope, BinanceError, BinanceKlineEvent, EVENT_DEPTH_UPDATE,
    EVENT_KLINE,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BinanceAdapter;

impl BinanceAdapter {
    pub const ID: &'static str = "binance";
}

/// Strip the combined-stream wrapper if present
fn unwrap_combined(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("stream") && map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

impl ProtocolAdapter for BinanceAdapter {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn decode(
        &self,
        frame: &[u8],
        source: &str,
        received_at: i64,
    ) -> Result<Vec<MarketEvent>, DecodeError> {
        let value = unwrap_combined(serde_json::from_slice(frame)?);
        let envelope = BinanceEnvelope::deserialize(&value)?;

        if let Some(event_type) = envelope.event_type.as_deref() {
            return match event_type {
                EVENT_KLINE => {
                    let msg = BinanceKlineEvent::deserialize(&value)?;
                    Ok(vec![kline_to_bar(msg, source, received_at)?.into()])
                }
                EVENT_DEPTH_UPDATE => {
                    let msg = BinanceDepthUpdate::deserialize(&value)?;
                    Ok(vec![depth_to_quote(msg, source, received_at).into()])
                }
                other => {
                    debug!(source = %source, event = %other, "ignoring binance event");
                    Ok(Vec::new())
                }
            };
        }

        if envelope.code.is_some() {
            let err = BinanceError::deserialize(&value)?;
            error!(source = %source, code = err.code, msg = %err.msg, "binance error");
        } else if let Some(id) = envelope.id {
            debug!(source = %source, id = %id, "binance request acknowledged");
        } else {
            debug!(source = %source, "ignoring unrecognized binance message");
        }
        Ok(Vec::new())
    }
}

fn kline_to_bar(
    msg: BinanceKlineEvent,
    source: &str,
    received_at: i64,
) -> Result<Bar, DecodeError> {
    let k = msg.kline;
    Ok(Bar {
        header: MessageHeader {
            symbol: msg.symbol,
            source: source.to_string(),
            time: k.start_time * 1000,
            time_srv: msg.event_time * 1000,
            time_rcv: received_at,
        },
        interval: canonical_interval(&k.interval)?,
        open: k.open,
        high: k.high,
        low: k.low,
        close: k.close,
        volume: k.volume,
    })
}

fn depth_to_quote(msg: BinanceDepthUpdate, source: &str, received_at: i64) -> Quote {
    let header = MessageHeader {
        symbol: msg.symbol,
        source: source.to_string(),
        time: msg.event_time * 1000,
        time_srv: msg.event_time * 1000,
        time_rcv: received_at,
    };
    Quote::new(header, msg.bids, msg.asks)
}
