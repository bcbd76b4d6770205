use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::MetadataError;

/// Default dial timeout in milliseconds
pub const DEFAULT_DIAL_TIMEOUT_MS: u64 = 10_000;
/// Default delay before a reconnect attempt in milliseconds
pub const DEFAULT_RETRY_DELAY_MS: u64 = 5_000;

fn default_dial_timeout_ms() -> u64 {
    DEFAULT_DIAL_TIMEOUT_MS
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

/// A single HTTP header sent with the upstream handshake (or monitor responses).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderSpec {
    pub name: String,
    pub value: String,
}

impl HeaderSpec {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One upstream WebSocket market data source.
///
/// Loaded once at startup and never mutated afterwards. Sources are disabled
/// unless `enabled: true` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Unique key, also stamped as `source` on every event from this connection
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    pub url: String,
    /// Protocol adapter id (`debug`, `binance`, `tinkoff`)
    pub adapter: String,
    #[serde(default = "default_dial_timeout_ms")]
    pub dial_timeout_ms: u64,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Keepalive timeout; 0 disables ping/pong
    #[serde(default)]
    pub ping_timeout_ms: u64,
    /// Max inbound message size in bytes; 0 keeps the library default
    #[serde(default)]
    pub read_limit: usize,
    /// Handshake headers, sent in order
    #[serde(default)]
    pub headers: Vec<HeaderSpec>,
    /// Text frames sent right after connecting, in order
    #[serde(default)]
    pub init_messages: Vec<String>,
}

impl SourceConfig {
    /// Enabled source with default timings
    pub fn new(name: impl Into<String>, url: impl Into<String>, adapter: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            url: url.into(),
            adapter: adapter.into(),
            dial_timeout_ms: DEFAULT_DIAL_TIMEOUT_MS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            ping_timeout_ms: 0,
            read_limit: 0,
            headers: Vec::new(),
            init_messages: Vec::new(),
        }
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// `None` when keepalive is disabled
    pub fn ping_timeout(&self) -> Option<Duration> {
        (self.ping_timeout_ms > 0).then(|| Duration::from_millis(self.ping_timeout_ms))
    }

    pub fn read_limit(&self) -> Option<usize> {
        (self.read_limit > 0).then_some(self.read_limit)
    }

    /// Check the url is a ws:// or wss:// url
    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.name.trim().is_empty() {
            return Err(MetadataError::Validation(
                "source name must not be empty".to_string(),
            ));
        }

        let invalid = |reason: String| MetadataError::InvalidUrl {
            source_name: self.name.clone(),
            url: self.url.clone(),
            reason,
        };

        let parsed = url::Url::parse(&self.url).map_err(|e| invalid(e.to_string()))?;
        match parsed.scheme() {
            "ws" | "wss" => Ok(()),
            other => Err(invalid(format!("unsupported scheme '{}'", other))),
        }
    }
}
