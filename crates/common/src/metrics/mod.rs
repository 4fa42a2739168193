//! Metrics and observability utilities
//!
//! Counters and histograms for the record source, the paper cache and the
//! graph engine, with standardized naming conventions.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

/// Metrics prefix for all RefNet metrics
pub const METRICS_PREFIX: &str = "refnet";

/// Buckets for record source latency (in seconds)
pub const SOURCE_LATENCY_BUCKETS: &[f64] = &[
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Record source metrics
    describe_counter!(
        format!("{}_source_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total record source calls by operation and outcome"
    );

    describe_histogram!(
        format!("{}_source_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Record source call latency in seconds"
    );

    describe_counter!(
        format!("{}_source_retries_total", METRICS_PREFIX),
        Unit::Count,
        "Retries issued after transient record source failures"
    );

    describe_counter!(
        format!("{}_batch_fallbacks_total", METRICS_PREFIX),
        Unit::Count,
        "Batch lookups degraded to individual lookups"
    );

    describe_counter!(
        format!("{}_records_rejected_total", METRICS_PREFIX),
        Unit::Count,
        "Raw records the normalizer refused"
    );

    // Cache metrics
    describe_counter!(
        format!("{}_cache_hits_total", METRICS_PREFIX),
        Unit::Count,
        "Total paper cache hits"
    );

    describe_counter!(
        format!("{}_cache_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Total paper cache misses"
    );

    // Graph metrics
    describe_counter!(
        format!("{}_admissions_total", METRICS_PREFIX),
        Unit::Count,
        "Papers admitted into the graph"
    );

    describe_counter!(
        format!("{}_admission_rejections_total", METRICS_PREFIX),
        Unit::Count,
        "Admission attempts refused, by reason"
    );

    describe_histogram!(
        format!("{}_expansion_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Wall-clock time of one expansion call"
    );

    describe_gauge!(
        format!("{}_graph_nodes", METRICS_PREFIX),
        Unit::Count,
        "Papers currently in the graph"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record one record source call
pub fn record_source_request(operation: &str, outcome: &str, duration_secs: f64) {
    counter!(
        format!("{}_source_requests_total", METRICS_PREFIX),
        "operation" => operation.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_source_request_duration_seconds", METRICS_PREFIX),
        "operation" => operation.to_string()
    )
    .record(duration_secs);
}

pub fn record_retry(operation: &str) {
    counter!(
        format!("{}_source_retries_total", METRICS_PREFIX),
        "operation" => operation.to_string()
    )
    .increment(1);
}

pub fn record_batch_fallback(requested: usize) {
    counter!(format!("{}_batch_fallbacks_total", METRICS_PREFIX)).increment(1);
    tracing::debug!(requested, "Batch fallback recorded");
}

pub fn record_rejected_record(reason: &str) {
    counter!(
        format!("{}_records_rejected_total", METRICS_PREFIX),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Helper to record cache metrics
pub fn record_cache(hit: bool, cache_name: &str) {
    if hit {
        counter!(
            format!("{}_cache_hits_total", METRICS_PREFIX),
            "cache" => cache_name.to_string()
        )
        .increment(1);
    } else {
        counter!(
            format!("{}_cache_misses_total", METRICS_PREFIX),
            "cache" => cache_name.to_string()
        )
        .increment(1);
    }
}

pub fn record_admission() {
    counter!(format!("{}_admissions_total", METRICS_PREFIX)).increment(1);
}

pub fn record_admission_rejection(reason: &str) {
    counter!(
        format!("{}_admission_rejections_total", METRICS_PREFIX),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Helper to record a finished expansion
pub fn record_expansion(duration_secs: f64, mode: &str, node_count: usize) {
    histogram!(
        format!("{}_expansion_duration_seconds", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .record(duration_secs);

    gauge!(format!("{}_graph_nodes", METRICS_PREFIX)).set(node_count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets() {
        let mut prev = 0.0;
        for &bucket in SOURCE_LATENCY_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
    }

    #[test]
    fn test_helpers_without_recorder() {
        // No recorder installed: every helper must be a no-op
        record_source_request("get_work", "ok", 0.01);
        record_retry("get_work");
        record_batch_fallback(3);
        record_cache(true, "papers");
        record_cache(false, "papers");
        record_admission_rejection("no_authors");
        record_expansion(0.5, "expand", 4);
    }
}
