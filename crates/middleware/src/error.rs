use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("publish failed: {0}")]
    PublishFailed(String),
    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),
    #[error("transport closed")]
    Closed,
}

/// Failure of an external client wrapped by [`crate::ResilientClient`]
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("operation failed: {0}")]
    Operation(String),
    #[error("shutting down")]
    Shutdown,
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::ConnectionFailed(msg) => ClientError::Connect(msg),
            other => ClientError::Operation(other.to_string()),
        }
    }
}
