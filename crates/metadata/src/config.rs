use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::error::MetadataError;
use crate::source::SourceConfig;

/// Default monitor listen address
pub const DEFAULT_MONITOR_BIND: &str = "127.0.0.1:9100";
/// Default NATS client name
pub const DEFAULT_NATS_NAME: &str = "StockMQ";
/// Default NATS server
pub const DEFAULT_NATS_URL: &str = "nats://127.0.0.1:4222";
/// Default delay between reconnect attempts of any store client
pub const DEFAULT_CLIENT_RETRY_DELAY_MS: u64 = 5_000;
/// Default lines per InfluxDB write
pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub level: String,
    /// JSON lines instead of the human-readable format
    pub json: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub bind: String,
    /// Upper bound on in-flight request drain during shutdown
    pub shutdown_grace_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_MONITOR_BIND.to_string(),
            shutdown_grace_ms: 1_000,
        }
    }
}

impl MonitorConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    pub name: String,
    pub url: String,
    pub retry_delay_ms: u64,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NATS_NAME.to_string(),
            url: DEFAULT_NATS_URL.to_string(),
            retry_delay_ms: DEFAULT_CLIENT_RETRY_DELAY_MS,
        }
    }
}

impl NatsConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// PostgreSQL JSONB document store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentStoreConfig {
    pub enabled: bool,
    /// libpq-style connection string
    pub url: String,
    pub retry_delay_ms: u64,
    pub bars_table: String,
    pub quotes_table: String,
}

impl Default for DocumentStoreConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "host=localhost user=stockmq dbname=stockmq".to_string(),
            retry_delay_ms: DEFAULT_CLIENT_RETRY_DELAY_MS,
            bars_table: "candles".to_string(),
            quotes_table: "quotes".to_string(),
        }
    }
}

impl DocumentStoreConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// InfluxDB v2 time-series store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSeriesConfig {
    pub enabled: bool,
    pub url: String,
    pub token: String,
    pub organization: String,
    pub bucket: String,
    pub retry_delay_ms: u64,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
}

impl Default for TimeSeriesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "http://127.0.0.1:8086".to_string(),
            token: String::new(),
            organization: "stockmq".to_string(),
            bucket: "stockmq-data".to_string(),
            retry_delay_ms: DEFAULT_CLIENT_RETRY_DELAY_MS,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval_ms: 1_000,
        }
    }
}

impl TimeSeriesConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

/// Top-level gateway configuration. Every section is optional, so an empty
/// file yields a config with no sources and all stores disabled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub logger: LoggerConfig,
    pub monitor: MonitorConfig,
    pub nats: NatsConfig,
    pub document_store: DocumentStoreConfig,
    pub timeseries: TimeSeriesConfig,
    pub sources: Vec<SourceConfig>,
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, MetadataError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate
    pub fn from_yaml(content: &str) -> Result<Self, MetadataError> {
        // serde_yaml reads an empty document as unit, not as an empty map
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: ServerConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MetadataError> {
        let mut seen = HashSet::new();
        for source in &self.sources {
            source.validate()?;
            if !seen.insert(source.name.as_str()) {
                return Err(MetadataError::DuplicateSource(source.name.clone()));
            }
        }

        if self.timeseries.batch_size == 0 {
            return Err(MetadataError::Validation(
                "timeseries.batch_size must be greater than zero".to_string(),
            ));
        }
        if self.timeseries.flush_interval_ms == 0 {
            return Err(MetadataError::Validation(
                "timeseries.flush_interval_ms must be greater than zero".to_string(),
            ));
        }

        for table in [
            &self.document_store.bars_table,
            &self.document_store.quotes_table,
        ] {
            if !is_identifier(table) {
                return Err(MetadataError::Validation(format!(
                    "invalid table name '{}'",
                    table
                )));
            }
        }

        Ok(())
    }

    /// Sources with `enabled: true`, in file order
    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }
}

/// Plain SQL identifier: letter or underscore, then letters, digits, underscores
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_full_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
logger:
  level: debug
  json: true
monitor:
  bind: "0.0.0.0:9200"
nats:
  url: nats://nats.internal:4222
document_store:
  enabled: true
  url: "host=pg user=stockmq dbname=md"
timeseries:
  enabled: true
  token: secret
  batch_size: 100
sources:
  - name: binance-btc
    enabled: true
    url: wss://stream.binance.com:9443/ws
    adapter: binance
    ping_timeout_ms: 30000
    init_messages:
      - '{{"method":"SUBSCRIBE","params":["btcusdt@kline_1m"],"id":1}}'
  - name: tinkoff
    url: wss://api-invest.tinkoff.ru/openapi/md/v1/md-openapi/ws
    adapter: tinkoff
"#
        )
        .unwrap();

        let config = ServerConfig::load(file.path()).unwrap();
        assert_eq!(config.logger.level, "debug");
        assert!(config.logger.json);
        assert_eq!(config.monitor.bind, "0.0.0.0:9200");
        assert_eq!(config.monitor.shutdown_grace(), Duration::from_secs(1));
        assert_eq!(config.nats.name, DEFAULT_NATS_NAME);
        assert_eq!(config.nats.url, "nats://nats.internal:4222");
        assert!(config.document_store.enabled);
        assert_eq!(config.document_store.bars_table, "candles");
        assert_eq!(config.timeseries.bucket, "stockmq-data");
        assert_eq!(config.timeseries.batch_size, 100);
        assert_eq!(config.sources.len(), 2);

        let enabled: Vec<_> = config.enabled_sources().map(|s| s.name.as_str()).collect();
        assert_eq!(enabled, vec!["binance-btc"]);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ServerConfig::from_yaml("").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.monitor.bind, DEFAULT_MONITOR_BIND);
        assert_eq!(config.nats.retry_delay(), Duration::from_secs(5));
        assert!(!config.document_store.enabled);
        assert!(!config.timeseries.enabled);
        assert!(config.sources.is_empty());
    }

    #[test]
    fn test_duplicate_source_names_rejected() {
        let yaml = r#"
sources:
  - name: a
    url: ws://127.0.0.1:1
    adapter: debug
  - name: a
    url: ws://127.0.0.1:2
    adapter: debug
"#;
        let err = ServerConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, MetadataError::DuplicateSource(name) if name == "a"));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let err = ServerConfig::from_yaml("timeseries: { batch_size: 0 }").unwrap_err();
        assert!(matches!(err, MetadataError::Validation(_)));
    }

    #[test]
    fn test_zero_flush_interval_rejected() {
        let err = ServerConfig::from_yaml("timeseries: { enabled: true, flush_interval_ms: 0 }")
            .unwrap_err();
        assert!(
            matches!(err, MetadataError::Validation(ref msg) if msg.contains("flush_interval_ms"))
        );
    }

    #[test]
    fn test_bad_table_name_rejected() {
        let err =
            ServerConfig::from_yaml("document_store: { bars_table: \"x; drop\" }").unwrap_err();
        assert!(matches!(err, MetadataError::Validation(_)));
    }

    #[test]
    fn test_non_websocket_url_rejected() {
        let yaml = r#"
sources:
  - name: a
    url: https://example.com
    adapter: debug
"#;
        let err = ServerConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, MetadataError::InvalidUrl { .. }));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = ServerConfig::load(Path::new("/nonexistent/stockmq.yaml")).unwrap_err();
        assert!(matches!(err, MetadataError::Io(_)));
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("candles"));
        assert!(is_identifier("_q2"));
        assert!(!is_identifier("2q"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("a-b"));
    }
}
