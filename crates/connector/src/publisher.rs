//! Fan-out of canonical events to every configured sink.

use std::sync::Arc;

use stockmq_schema::MarketEvent;
use tracing::{debug, warn};

use crate::error::SinkError;
use crate::metrics;
use crate::sinks::Sink;

/// Hands each event to every sink on its own task.
///
/// `publish` never waits on a sink and never reports a sink failure to the
/// caller; failures are logged and counted per sink.
#[derive(Clone, Default)]
pub struct FanoutPublisher {
    sinks: Vec<Arc<dyn Sink>>,
}

impl FanoutPublisher {
    pub fn new(sinks: Vec<Arc<dyn Sink>>) -> Self {
        Self { sinks }
    }

    pub fn sinks(&self) -> &[Arc<dyn Sink>] {
        &self.sinks
    }

    pub fn publish(&self, event: MarketEvent) {
        let event = Arc::new(event);
        for sink in &self.sinks {
            let sink = Arc::clone(sink);
            let event = Arc::clone(&event);
            tokio::spawn(async move {
                match sink.deliver(&event).await {
                    Ok(()) => {}
                    Err(SinkError::Unavailable(name)) => {
                        debug!(sink = %name, "sink unavailable, dropping event");
                        metrics::inc_sink_error(sink.name());
                    }
                    Err(e) => {
                        warn!(
                            sink = %sink.name(),
                            routing_key = %event.routing_key(),
                            error = %e,
                            "sink delivery failed"
                        );
                        metrics::inc_sink_error(sink.name());
                    }
                }
            });
        }
    }
}
