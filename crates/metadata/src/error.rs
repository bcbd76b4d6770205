use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("duplicate source name: {0}")]
    DuplicateSource(String),
    #[error("source {source_name}: invalid url {url}: {reason}")]
    InvalidUrl {
        source_name: String,
        url: String,
        reason: String,
    },
    #[error("validation error: {0}")]
    Validation(String),
}
