//! Protocol adapters: raw upstream frames in, canonical events out.
//!
//! Adapters are pure. They never touch the network or block, and a frame they
//! cannot make sense of comes back as a [`DecodeError`] for the caller to log.
//! Adapter ids from config are resolved once through [`Adapter::from_id`] so an
//! unknown id fails at startup rather than at the first frame.

pub mod binance;
pub mod debug;
pub mod tinkoff;

use stockmq_schema::{is_canonical, MarketEvent};

use crate::error::DecodeError;

pub use binance::BinanceAdapter;
pub use debug::DebugAdapter;
pub use tinkoff::TinkoffAdapter;

/// Decoder for one upstream wire format
pub trait ProtocolAdapter: Send + Sync {
    /// Registry key used in config
    fn id(&self) -> &'static str;

    /// Decode one frame. `received_at` is the local receipt time in
    /// microseconds and is copied verbatim into every emitted header.
    fn decode(
        &self,
        frame: &[u8],
        source: &str,
        received_at: i64,
    ) -> Result<Vec<MarketEvent>, DecodeError>;
}

/// Every adapter the gateway knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adapter {
    Debug(DebugAdapter),
    Binance(BinanceAdapter),
    Tinkoff(TinkoffAdapter),
}

impl Adapter {
    pub const IDS: [&'static str; 3] = [DebugAdapter::ID, BinanceAdapter::ID, TinkoffAdapter::ID];

    /// Resolve a config id (case-insensitive)
    pub fn from_id(id: &str) -> Option<Self> {
        match id.to_ascii_lowercase().as_str() {
            DebugAdapter::ID => Some(Adapter::Debug(DebugAdapter)),
            BinanceAdapter::ID => Some(Adapter::Binance(BinanceAdapter)),
            TinkoffAdapter::ID => Some(Adapter::Tinkoff(TinkoffAdapter)),
            _ => None,
        }
    }
}

impl ProtocolAdapter for Adapter {
    fn id(&self) -> &'static str {
        match self {
            Adapter::Debug(a) => a.id(),
            Adapter::Binance(a) => a.id(),
            Adapter::Tinkoff(a) => a.id(),
        }
    }

    fn decode(
        &self,
        frame: &[u8],
        source: &str,
        received_at: i64,
    ) -> Result<Vec<MarketEvent>, DecodeError> {
        match self {
            Adapter::Debug(a) => a.decode(frame, source, received_at),
            Adapter::Binance(a) => a.decode(frame, source, received_at),
            Adapter::Tinkoff(a) => a.decode(frame, source, received_at),
        }
    }
}

/// Accept an interval only if it is already in the canonical vocabulary
pub(crate) fn canonical_interval(interval: &str) -> Result<String, DecodeError> {
    if is_canonical(interval) {
        Ok(interval.to_string())
    } else {
        Err(DecodeError::UnknownInterval(interval.to_string()))
    }
}
