//! Prometheus metrics for the gateway
//!
//! Per-source counters for frame flow and decode health, plus per-client
//! reconnect and per-sink error counters.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, Encoder,
    HistogramVec, IntCounterVec, IntGaugeVec, TextEncoder,
};
use std::time::Duration;

const LABEL_SOURCE: &str = "source";
const LABEL_KIND: &str = "kind";
const LABEL_CLIENT: &str = "client";
const LABEL_SINK: &str = "sink";

/// Frames read from each upstream
static FRAMES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "stockmq_frames_total",
        "Total frames read from upstream sources",
        &[LABEL_SOURCE]
    )
    .expect("Failed to register frames_total metric")
});

static DECODE_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "stockmq_decode_errors_total",
        "Frames the adapter failed to decode",
        &[LABEL_SOURCE]
    )
    .expect("Failed to register decode_errors_total metric")
});

static EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "stockmq_events_total",
        "Canonical events emitted per source and kind",
        &[LABEL_SOURCE, LABEL_KIND]
    )
    .expect("Failed to register events_total metric")
});

static RECONNECTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "stockmq_reconnects_total",
        "Reconnects scheduled per upstream source or external client",
        &[LABEL_CLIENT]
    )
    .expect("Failed to register reconnects_total metric")
});

static SINK_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "stockmq_sink_errors_total",
        "Failed or skipped deliveries per sink",
        &[LABEL_SINK]
    )
    .expect("Failed to register sink_errors_total metric")
});

/// 1 = connected, 0 = not
static SOURCE_CONNECTED: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "stockmq_source_connected",
        "Upstream connection status (1=connected, 0=disconnected)",
        &[LABEL_SOURCE]
    )
    .expect("Failed to register source_connected metric")
});

static DECODE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "stockmq_decode_duration_seconds",
        "Time spent decoding one frame",
        &[LABEL_SOURCE],
        vec![0.000_001, 0.000_005, 0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005]
    )
    .expect("Failed to register decode_duration metric")
});

/// Metrics handle bound to one upstream source
#[derive(Clone, Debug)]
pub struct SourceMetrics {
    source: String,
}

impl SourceMetrics {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn inc_frame(&self) {
        FRAMES_TOTAL.with_label_values(&[&self.source]).inc();
    }

    pub fn inc_decode_error(&self) {
        DECODE_ERRORS_TOTAL.with_label_values(&[&self.source]).inc();
    }

    pub fn inc_event(&self, kind: &str) {
        EVENTS_TOTAL.with_label_values(&[&self.source, kind]).inc();
    }

    pub fn observe_decode(&self, elapsed: Duration) {
        DECODE_DURATION
            .with_label_values(&[&self.source])
            .observe(elapsed.as_secs_f64());
    }

    pub fn inc_reconnect(&self) {
        inc_reconnect(&self.source);
    }

    pub fn set_connected(&self) {
        SOURCE_CONNECTED.with_label_values(&[&self.source]).set(1);
    }

    pub fn set_disconnected(&self) {
        SOURCE_CONNECTED.with_label_values(&[&self.source]).set(0);
    }

    pub fn frames(&self) -> u64 {
        FRAMES_TOTAL.with_label_values(&[&self.source]).get()
    }

    pub fn decode_errors(&self) -> u64 {
        DECODE_ERRORS_TOTAL.with_label_values(&[&self.source]).get()
    }
}

/// Record a scheduled reconnect for a source or client
pub fn inc_reconnect(client: &str) {
    RECONNECTS_TOTAL.with_label_values(&[client]).inc();
}

pub fn inc_sink_error(sink: &str) {
    SINK_ERRORS_TOTAL.with_label_values(&[sink]).inc();
}

pub fn sink_errors(sink: &str) -> u64 {
    SINK_ERRORS_TOTAL.with_label_values(&[sink]).get()
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        prometheus::Error::Msg(format!("Failed to encode metrics as UTF-8: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_metrics_count() {
        let metrics = SourceMetrics::new("metrics-test-source");
        metrics.inc_frame();
        metrics.inc_frame();
        metrics.inc_decode_error();
        metrics.inc_event("bar");
        metrics.observe_decode(Duration::from_micros(3));
        metrics.set_connected();

        assert_eq!(metrics.frames(), 2);
        assert_eq!(metrics.decode_errors(), 1);
    }

    #[test]
    fn test_encode_metrics_contains_families() {
        let metrics = SourceMetrics::new("metrics-encode-source");
        metrics.inc_frame();
        inc_sink_error("metrics-encode-sink");
        inc_reconnect("metrics-encode-client");

        let output = encode_metrics().unwrap();
        assert!(output.contains("stockmq_frames_total"));
        assert!(output.contains("metrics-encode-sink"));
        assert!(output.contains("stockmq_reconnects_total"));
    }
}
