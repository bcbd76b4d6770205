//! Destinations for canonical events.
//!
//! Each sink owns a [`stockmq_middleware::ResilientClient`] and reports its own
//! failures to it. A sink with no live handle answers
//! [`SinkError::Unavailable`] immediately instead of waiting for one.

pub mod bus;
pub mod document;
pub mod timeseries;

use async_trait::async_trait;
use stockmq_schema::MarketEvent;

use crate::error::SinkError;

pub use bus::BusSink;
pub use document::DocumentStore;
pub use timeseries::TimeSeriesStore;

#[async_trait]
pub trait Sink: Send + Sync + 'static {
    /// Dependency name used in logs, metrics and health output
    fn name(&self) -> &str;

    /// Open the underlying client. Failures are logged and retried by the
    /// client itself.
    async fn start(&self);

    async fn deliver(&self, event: &MarketEvent) -> Result<(), SinkError>;

    /// Live handle present and usable
    async fn is_healthy(&self) -> bool;

    /// Push out buffered writes
    async fn flush(&self) {}

    async fn close(&self);
}
