//! stockmq-schema: canonical market data events
//!
//! Every upstream feed is normalized into these types before it reaches the bus
//! or a store. Prices, sizes and volumes are kept as the upstream's decimal
//! strings so no precision is lost on the way through.
//!
//! Wire shape (JSON) is the header fields flattened next to the bar or quote
//! fields, e.g. `{"symbol":"BTCUSDT","source":"binance","time":..,"time_srv":..,
//! "time_rcv":..,"interval":"1m","open":"..",...}`.

pub mod interval;

use serde::{Deserialize, Serialize};

pub use interval::{is_canonical, CANONICAL_INTERVALS};

/// Fields common to every canonical event. All times are microseconds since the
/// Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub symbol: String,
    pub source: String,
    /// Event time as reported by the upstream
    pub time: i64,
    /// Time the upstream emitted the message
    pub time_srv: i64,
    /// Local receipt time, stamped once when the frame is read
    pub time_rcv: i64,
}

/// OHLCV candle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    #[serde(flatten)]
    pub header: MessageHeader,
    pub interval: String,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
}

/// One book level, serialized as a two-element array `[price, size]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel(pub String, pub String);

impl PriceLevel {
    pub fn new(price: impl Into<String>, size: impl Into<String>) -> Self {
        Self(price.into(), size.into())
    }

    pub fn price(&self) -> &str {
        &self.0
    }

    pub fn size(&self) -> &str {
        &self.1
    }
}

/// Order book snapshot or delta.
///
/// `bids_depth` and `asks_depth` always equal the length of their sequence when
/// built through [`Quote::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    #[serde(flatten)]
    pub header: MessageHeader,
    pub bids_depth: usize,
    pub bids: Vec<PriceLevel>,
    pub asks_depth: usize,
    pub asks: Vec<PriceLevel>,
}

impl Quote {
    pub fn new(header: MessageHeader, bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) -> Self {
        Self {
            header,
            bids_depth: bids.len(),
            bids,
            asks_depth: asks.len(),
            asks,
        }
    }

    /// Depth fields match their sequences
    pub fn is_consistent(&self) -> bool {
        self.bids_depth == self.bids.len() && self.asks_depth == self.asks.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Bar,
    Quote,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Bar => "bar",
            EventKind::Quote => "quote",
        }
    }
}

/// A canonical event as handed to the fan-out publisher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MarketEvent {
    Bar(Bar),
    Quote(Quote),
}

impl MarketEvent {
    pub fn header(&self) -> &MessageHeader {
        match self {
            MarketEvent::Bar(bar) => &bar.header,
            MarketEvent::Quote(quote) => &quote.header,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            MarketEvent::Bar(_) => EventKind::Bar,
            MarketEvent::Quote(_) => EventKind::Quote,
        }
    }

    /// Bus subject for this event.
    ///
    /// Bars: `C.<interval>.<symbol>.<source>`, quotes: `Q.<symbol>.<source>`.
    /// Downstream consumers subscribe with wildcards on this layout.
    pub fn routing_key(&self) -> String {
        match self {
            MarketEvent::Bar(bar) => format!(
                "C.{}.{}.{}",
                bar.interval, bar.header.symbol, bar.header.source
            ),
            MarketEvent::Quote(quote) => {
                format!("Q.{}.{}", quote.header.symbol, quote.header.source)
            }
        }
    }
}

impl From<Bar> for MarketEvent {
    fn from(bar: Bar) -> Self {
        MarketEvent::Bar(bar)
    }
}

impl From<Quote> for MarketEvent {
    fn from(quote: Quote) -> Self {
        MarketEvent::Quote(quote)
    }
}
