use thiserror::Error;

/// A frame the adapter could not turn into events. Logged and skipped; never
/// tears down the connection.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown interval: {0}")]
    UnknownInterval(String),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// Failure on an upstream WebSocket. Always routed to the supervisor's
/// reconnect path.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("dial failed: {0}")]
    Dial(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("dial timed out after {0}ms")]
    DialTimeout(u64),
    #[error("handshake request invalid: {0}")]
    Handshake(String),
    #[error("write failed: {0}")]
    Write(String),
    #[error("read failed: {0}")]
    Read(String),
    #[error("connection closed by peer")]
    ClosedByPeer,
    #[error("no pong within {0}ms")]
    PingTimeout(u64),
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("sink {0} unavailable")]
    Unavailable(String),
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("publish failed: {0}")]
    Publish(#[from] stockmq_middleware::TransportError),
    #[error("store write failed: {0}")]
    Store(String),
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("server already started")]
    AlreadyStarted,
    #[error("source {source_name}: unknown adapter '{adapter}'")]
    UnknownAdapter { source_name: String, adapter: String },
    #[error("configuration error: {0}")]
    Config(#[from] stockmq_metadata::MetadataError),
    #[error("failed to bind monitor on {addr}: {reason}")]
    Bind { addr: String, reason: String },
}
