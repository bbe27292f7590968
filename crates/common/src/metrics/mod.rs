//! Metrics and observability utilities
//!
//! Prometheus metrics for the upload pipeline and HTTP layer, with
//! standardized naming under a single prefix.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all DeepSearch metrics
pub const METRICS_PREFIX: &str = "deepsearch";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s, upload with extraction
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Upload metrics
    describe_counter!(
        format!("{}_uploads_total", METRICS_PREFIX),
        Unit::Count,
        "Total documents accepted by the upload pipeline"
    );

    describe_histogram!(
        format!("{}_upload_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end upload pipeline latency in seconds"
    );

    describe_histogram!(
        format!("{}_upload_size_bytes", METRICS_PREFIX),
        Unit::Bytes,
        "Size of uploaded files"
    );

    // Extraction metrics
    describe_counter!(
        format!("{}_entity_extractions_total", METRICS_PREFIX),
        Unit::Count,
        "Entity extraction calls by outcome"
    );

    describe_histogram!(
        format!("{}_entity_extraction_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Entity extraction latency in seconds"
    );

    describe_counter!(
        format!("{}_pdf_extraction_failures_total", METRICS_PREFIX),
        Unit::Count,
        "PDFs whose text could not be extracted"
    );

    // Storage metrics
    describe_counter!(
        format!("{}_storage_operations_total", METRICS_PREFIX),
        Unit::Count,
        "Object storage calls by operation and outcome"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record a completed upload
pub fn record_upload(duration_secs: f64, size_bytes: usize, entities: usize) {
    counter!(format!("{}_uploads_total", METRICS_PREFIX)).increment(1);

    histogram!(format!("{}_upload_duration_seconds", METRICS_PREFIX)).record(duration_secs);

    histogram!(format!("{}_upload_size_bytes", METRICS_PREFIX)).record(size_bytes as f64);

    tracing::debug!(duration_secs, size_bytes, entities, "Upload recorded");
}

/// Helper to record entity extraction metrics
pub fn record_entity_extraction(duration_secs: f64, model: &str, outcome: &str) {
    counter!(
        format!("{}_entity_extractions_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_entity_extraction_duration_seconds", METRICS_PREFIX),
        "model" => model.to_string()
    )
    .record(duration_secs);
}

/// Helper to count PDFs that fell back to the extraction sentinel
pub fn record_pdf_extraction_failure() {
    counter!(format!("{}_pdf_extraction_failures_total", METRICS_PREFIX)).increment(1);
}

/// Helper to record object storage calls
pub fn record_storage_op(provider: &str, operation: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_storage_operations_total", METRICS_PREFIX),
        "provider" => provider.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
