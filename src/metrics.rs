use lazy_static::lazy_static;
use prometheus::{
    Counter, Encoder, Histogram, TextEncoder, register_counter, register_histogram,
};

use crate::error::Result;

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("speech_gateway_requests_total", "Total number of grading requests").unwrap();
    pub static ref CACHE_HITS: Counter =
        register_counter!("speech_gateway_cache_hits_total", "Total cache hits").unwrap();
    pub static ref CACHE_MISSES: Counter =
        register_counter!("speech_gateway_cache_misses_total", "Total cache misses").unwrap();
    pub static ref REMOTE_FAILURES: Counter = register_counter!(
        "speech_gateway_remote_failures_total",
        "Scoring calls that were unavailable or rejected"
    )
    .unwrap();
    pub static ref RECORDINGS_REMOVED: Counter = register_counter!(
        "speech_gateway_recordings_removed_total",
        "Recordings deleted by the retention sweeper"
    )
    .unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "speech_gateway_request_latency_seconds",
        "Request latency in seconds"
    )
    .unwrap();
}

// Prometheus text exposition of the default registry
pub fn render() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
