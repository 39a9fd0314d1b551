//! Production-grade metrics with Prometheus
//!
//! Exposes key operational metrics for monitoring and alerting:
//! - Request rates and latencies
//! - Visit and conversion recording rates
//! - Test lifecycle events (completions, expiries)
//!
//! NOTE: We intentionally avoid test_id/visitor_id in metric labels to
//! prevent high-cardinality explosion that can crash Prometheus.

use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
};

lazy_static! {
    /// Global metrics registry
    pub static ref METRICS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Request Metrics
    // ============================================================================

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "splitgate_http_request_duration_seconds",
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["method", "endpoint", "status"]
    ).unwrap();

    /// Total HTTP requests
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("splitgate_http_requests_total", "Total HTTP requests"),
        &["method", "endpoint", "status"]
    ).unwrap();

    // ============================================================================
    // Traffic Recording Metrics
    // ============================================================================

    /// Visit recording operations
    pub static ref VISITS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("splitgate_visits_total", "Total visit recordings"),
        &["result"]  // result: "recorded", "deduped", "error"
    ).unwrap();

    /// Conversion recording operations
    pub static ref CONVERSIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("splitgate_conversions_total", "Total conversion recordings"),
        &["result"]  // result: "recorded", "deduped", "error"
    ).unwrap();

    /// Visit handling duration (assignment + counter update + persist)
    pub static ref VISIT_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "splitgate_visit_duration_seconds",
            "Visit handling duration"
        )
        .buckets(vec![0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05])
    ).unwrap();

    // ============================================================================
    // Test Lifecycle Metrics
    // ============================================================================

    /// Tests auto-completed with a significant winner
    pub static ref TESTS_COMPLETED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("splitgate_tests_completed_total", "Tests completed"),
        &["reason"]  // reason: "winner", "expired", "manual"
    ).unwrap();

    /// Currently active tests
    pub static ref ACTIVE_TESTS: IntGauge = IntGauge::new(
        "splitgate_active_tests",
        "Number of tests currently collecting traffic"
    ).unwrap();

    // ============================================================================
    // Error Metrics
    // ============================================================================

    /// Total error responses by error code
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("splitgate_errors_total", "Total error responses by error code"),
        &["error_type"]
    ).unwrap();
}

/// Register all metrics with the global registry
pub fn register_metrics() -> Result<(), prometheus::Error> {
    // Request metrics
    METRICS_REGISTRY.register(Box::new(HTTP_REQUEST_DURATION.clone()))?;
    METRICS_REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()))?;

    // Traffic recording metrics
    METRICS_REGISTRY.register(Box::new(VISITS_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(CONVERSIONS_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(VISIT_DURATION.clone()))?;

    // Test lifecycle metrics
    METRICS_REGISTRY.register(Box::new(TESTS_COMPLETED_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(ACTIVE_TESTS.clone()))?;

    // Error metrics
    METRICS_REGISTRY.register(Box::new(ERRORS_TOTAL.clone()))?;

    Ok(())
}

/// Helper to time operations with histogram (RAII pattern)
/// Usage: let _timer = Timer::new(VISIT_DURATION.clone());
pub struct Timer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl Timer {
    /// Create timer that records duration to histogram on drop
    pub fn new(histogram: Histogram) -> Self {
        Self {
            histogram,
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}
