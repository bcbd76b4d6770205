//! stockmq-connector: market data gateway runtime
//!
//! Supervised upstream WebSocket connections, per-exchange protocol adapters,
//! fan-out to the bus and stores, and the HTTP monitor that reports on them.

pub mod adapter;
pub mod error;
pub mod health;
mod keepalive;
pub mod metrics;
pub mod orchestrator;
pub mod publisher;
pub mod server;
pub mod sinks;
pub mod websocket;

pub use adapter::{Adapter, ProtocolAdapter};
pub use error::{ConnectionError, DecodeError, ServerError, SinkError};
pub use health::HealthStatus;
pub use orchestrator::{spawn_signal_handler, termination_signal, Server, ServerState};
pub use publisher::FanoutPublisher;
pub use server::{create_router, MonitorServer, MonitorState};
pub use sinks::{BusSink, DocumentStore, Sink, TimeSeriesStore};
pub use websocket::{ConnectionState, SourceConnection};
