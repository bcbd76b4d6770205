//! stockmq-metadata: gateway configuration types and loader

pub mod config;
pub mod error;
pub mod source;

pub use config::{
    DocumentStoreConfig, LoggerConfig, MonitorConfig, NatsConfig, ServerConfig, TimeSeriesConfig,
};
pub use error::MetadataError;
pub use source::{HeaderSpec, SourceConfig};
