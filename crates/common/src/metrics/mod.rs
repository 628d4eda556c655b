//! Metrics and observability utilities
//!
//! Provides counters and histograms for the indexing and retrieval paths
//! with standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all docindex metrics
pub const METRICS_PREFIX: &str = "docindex";

/// Register all metric descriptions
pub fn register_metrics() {
    // Indexing metrics
    describe_counter!(
        format!("{}_chunks_indexed_total", METRICS_PREFIX),
        Unit::Count,
        "Chunks accepted by bulk index requests"
    );

    describe_counter!(
        format!("{}_chunk_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Chunks skipped or rejected during indexing"
    );

    describe_counter!(
        format!("{}_chunks_deleted_total", METRICS_PREFIX),
        Unit::Count,
        "Chunk ids submitted for deletion"
    );

    describe_counter!(
        format!("{}_probe_checks_total", METRICS_PREFIX),
        Unit::Count,
        "Existence checks issued while probing legacy documents"
    );

    describe_histogram!(
        format!("{}_bulk_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Bulk request latency in seconds"
    );

    // Search metrics
    describe_counter!(
        format!("{}_search_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of retrieval queries"
    );

    describe_histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Retrieval latency in seconds"
    );

    tracing::info!("Metrics registered");
}

/// Helper to time a retrieval call
pub struct SearchTimer {
    start: Instant,
    mode: &'static str,
}

impl SearchTimer {
    /// Start tracking a retrieval
    pub fn start(mode: &'static str) -> Self {
        Self {
            start: Instant::now(),
            mode,
        }
    }

    /// Record completion with the number of chunks returned
    pub fn finish(self, result_count: usize) {
        record_search(self.start.elapsed().as_secs_f64(), self.mode, result_count);
    }
}

/// Helper to record search metrics
pub fn record_search(duration_secs: f64, mode: &str, result_count: usize) {
    counter!(
        format!("{}_search_queries_total", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .record(duration_secs);

    tracing::debug!(mode, result_count, duration_secs, "Retrieval finished");
}

/// Helper to record a bulk request
pub fn record_bulk(duration_secs: f64, operation: &str, accepted: usize, failed: usize) {
    histogram!(
        format!("{}_bulk_duration_seconds", METRICS_PREFIX),
        "operation" => operation.to_string()
    )
    .record(duration_secs);

    match operation {
        "index" => {
            counter!(format!("{}_chunks_indexed_total", METRICS_PREFIX))
                .increment(accepted as u64);
        }
        "delete" => {
            counter!(format!("{}_chunks_deleted_total", METRICS_PREFIX))
                .increment(accepted as u64);
        }
        _ => {}
    }

    if failed > 0 {
        counter!(
            format!("{}_chunk_failures_total", METRICS_PREFIX),
            "operation" => operation.to_string()
        )
        .increment(failed as u64);
    }
}

/// Helper to record chunks dropped before reaching the engine
pub fn record_skipped_chunks(count: usize) {
    if count > 0 {
        counter!(
            format!("{}_chunk_failures_total", METRICS_PREFIX),
            "operation" => "prepare"
        )
        .increment(count as u64);
    }
}

/// Helper to record probe existence checks
pub fn record_probe_checks(checks: usize) {
    counter!(format!("{}_probe_checks_total", METRICS_PREFIX)).increment(checks as u64);
}
