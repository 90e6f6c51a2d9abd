//! Prometheus metrics for metadata retrieval

use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, HistogramVec,
    IntCounterVec, IntGauge,
};
use std::sync::OnceLock;

/// Histogram buckets for source attempt latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<RetrievalMetricsInner> = OnceLock::new();

struct RetrievalMetricsInner {
    source_attempts: IntCounterVec,
    attempt_latency_seconds: HistogramVec,
    cache_populated: IntGauge,
}

impl RetrievalMetricsInner {
    fn new() -> Self {
        Self {
            source_attempts: register_int_counter_vec!(
                "instance_metadata_source_attempts_total",
                "Metadata source attempts by outcome",
                &["source", "outcome"]
            )
            .expect("Failed to register source_attempts"),

            attempt_latency_seconds: register_histogram_vec!(
                "instance_metadata_retrieval_latency_seconds",
                "Time spent in a single metadata source attempt",
                &["source"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register retrieval_latency_seconds"),

            cache_populated: register_int_gauge!(
                "instance_metadata_cache_populated",
                "Whether the process-wide metadata cache holds a value"
            )
            .expect("Failed to register cache_populated"),
        }
    }
}

/// Handle to the process-wide retrieval metrics
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct RetrievalMetrics {
    _private: (),
}

impl Default for RetrievalMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RetrievalMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(RetrievalMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &RetrievalMetricsInner {
        GLOBAL_METRICS.get_or_init(RetrievalMetricsInner::new)
    }

    /// Record the outcome and duration of one source attempt
    pub fn record_attempt(&self, source: &str, success: bool, duration_secs: f64) {
        let outcome = if success { "success" } else { "failure" };
        let inner = self.inner();
        inner
            .source_attempts
            .with_label_values(&[source, outcome])
            .inc();
        inner
            .attempt_latency_seconds
            .with_label_values(&[source])
            .observe(duration_secs);
    }

    pub fn set_cache_populated(&self, populated: bool) {
        self.inner().cache_populated.set(i64::from(populated));
    }

    pub fn attempts(&self, source: &str, success: bool) -> u64 {
        let outcome = if success { "success" } else { "failure" };
        self.inner()
            .source_attempts
            .with_label_values(&[source, outcome])
            .get()
    }
}
