use stockmq_schema::MarketEvent;
use tracing::info;

use super::ProtocolAdapter;
use crate::error::DecodeError;

/// Logs every frame and emits nothing. Useful for poking at a new feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugAdapter;

impl DebugAdapter {
    pub const ID: &'static str = "debug";
}

impl ProtocolAdapter for DebugAdapter {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn decode(
        &self,
        frame: &[u8],
        source: &str,
        _received_at: i64,
    ) -> Result<Vec<MarketEvent>, DecodeError> {
        info!(source = %source, frame = %String::from_utf8_lossy(frame), "frame");
        Ok(Vec::new())
    }
}
