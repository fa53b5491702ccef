//! Prometheus metrics

use lazy_static::lazy_static;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
};

lazy_static! {
    // Registry for holding metric state
    pub static ref REGISTRY: Registry = Registry::new();
    // Request counter by outcome
    pub static ref REQUESTS: IntCounterVec = IntCounterVec::new(
        Opts::new("transform_requests", "The number of transform requests handled"),
        &["outcome"]
    ).unwrap();
    // Selected events written to output files
    pub static ref EVENTS_WRITTEN: IntCounter = IntCounter::new(
        "events_written", "The number of selected events written to output files"
    ).unwrap();
    // Output bytes uploaded to the object store
    pub static ref BYTES_UPLOADED: IntCounter = IntCounter::new(
        "bytes_uploaded", "The number of output bytes uploaded to the object store"
    ).unwrap();
    // Transform duration histogram
    pub static ref TRANSFORM_TIME: Histogram = Histogram::with_opts(
        HistogramOpts::new("transform_time", "The time taken to transform each file")
            .buckets(prometheus::exponential_buckets(0.1, 2.0, 12).unwrap())
    ).unwrap();
}

/// Outcome label for requests that completed.
pub const OUTCOME_COMPLETED: &str = "completed";
/// Outcome label for requests that failed.
pub const OUTCOME_FAILED: &str = "failed";
/// Outcome label for messages that could not be decoded as a request.
pub const OUTCOME_MALFORMED: &str = "malformed";

pub fn register_metrics() {
    REGISTRY.register(Box::new(REQUESTS.clone())).unwrap();
    REGISTRY.register(Box::new(EVENTS_WRITTEN.clone())).unwrap();
    REGISTRY.register(Box::new(BYTES_UPLOADED.clone())).unwrap();
    REGISTRY.register(Box::new(TRANSFORM_TIME.clone())).unwrap();
}

/// Count a handled request.
pub fn record_request(outcome: &str) {
    REQUESTS.with_label_values(&[outcome]).inc();
}

pub async fn metrics_handler() -> String {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(error) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", error);
    }

    String::from_utf8_lossy(&buffer).into_owned()
}
