//! Metrics and observability utilities
//!
//! Prometheus metrics behind the `metrics` facade with standardized
//! naming. Descriptions are registered once at startup.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Mockview metrics
pub const METRICS_PREFIX: &str = "mockview";

/// Histogram buckets for HTTP request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.00,
];

/// Buckets for model calls, which run for seconds to minutes
pub const LLM_BUCKETS: &[f64] = &[
    0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0, 300.0,
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

    // Analysis metrics
    describe_counter!(
        format!("{}_analyses_total", METRICS_PREFIX),
        Unit::Count,
        "Model analyses by kind and outcome"
    );

    describe_histogram!(
        format!("{}_analysis_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Model analysis latency in seconds"
    );

    describe_counter!(
        format!("{}_stream_chunks_total", METRICS_PREFIX),
        Unit::Count,
        "Streamed text fragments relayed to clients"
    );

    describe_counter!(
        format!("{}_partial_saves_total", METRICS_PREFIX),
        Unit::Count,
        "Partial analyses salvaged after a client disconnect"
    );

    // Import metrics
    describe_counter!(
        format!("{}_import_jobs_total", METRICS_PREFIX),
        Unit::Count,
        "Document imports by kind and final status"
    );

    describe_histogram!(
        format!("{}_import_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Document import latency in seconds"
    );

    // Jobs
    describe_gauge!(
        format!("{}_jobs_in_flight", METRICS_PREFIX),
        Unit::Count,
        "Background jobs currently running"
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

/// Record one analysis call; `kind` is the prompt type
pub fn record_analysis(kind: &str, duration_secs: f64, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_analyses_total", METRICS_PREFIX),
        "kind" => kind.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_analysis_duration_seconds", METRICS_PREFIX),
            "kind" => kind.to_string()
        )
        .record(duration_secs);
    }
}

pub fn record_stream_chunk() {
    counter!(format!("{}_stream_chunks_total", METRICS_PREFIX)).increment(1);
}

pub fn record_partial_save() {
    counter!(format!("{}_partial_saves_total", METRICS_PREFIX)).increment(1);
}

/// Record a finished import job
pub fn record_import(kind: &str, status: &str, duration_secs: f64) {
    counter!(
        format!("{}_import_jobs_total", METRICS_PREFIX),
        "kind" => kind.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_import_duration_seconds", METRICS_PREFIX),
        "kind" => kind.to_string()
    )
    .record(duration_secs);
}

pub fn set_jobs_in_flight(count: usize) {
    gauge!(format!("{}_jobs_in_flight", METRICS_PREFIX)).set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_sorted() {
        for buckets in [LATENCY_BUCKETS, LLM_BUCKETS] {
            let mut prev = 0.0;
            for &bucket in buckets {
                assert!(bucket > prev);
                prev = bucket;
            }
        }
    }

    #[test]
    fn test_recorders_without_exporter() {
        // no recorder installed: every call is a no-op
        let metrics = RequestMetrics::start("GET", "/api/v1/questions");
        metrics.finish(200);
        record_analysis("single_analyze", 1.5, true);
        record_import("paper", "failed", 0.2);
        set_jobs_in_flight(0);
    }
}
