//! stockmq-middleware: transport and client-lifecycle plumbing
//!
//! Provides the pub/sub [`Transport`] abstraction (NATS in production,
//! in-memory for tests), the process-wide [`Shutdown`] signal, and
//! [`ResilientClient`], the connect / fail / delayed-retry wrapper shared by
//! every external client the gateway talks to.

pub mod error;
pub mod latency;
pub mod memory;
pub mod nats;
pub mod resilient;
pub mod shutdown;
pub mod transport;

pub use error::{ClientError, TransportError};
pub use memory::InMemoryTransport;
pub use nats::NatsTransport;
pub use resilient::{Connect, ResilientClient};
pub use shutdown::Shutdown;
pub use transport::{Subscription, Transport, TransportMessage};
