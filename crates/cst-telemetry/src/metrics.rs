//! Prometheus metrics for proof verification and group scans.
//!
//! All metrics follow the naming convention: `cst_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter,
    IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // VERIFICATION
    // =========================================================================

    /// Proofs that hashed up to their root
    pub static ref PROOFS_VERIFIED: IntCounter = IntCounter::new(
        "cst_proofs_verified_total",
        "Inclusion proofs verified against their root"
    ).expect("metric creation failed");

    /// Proofs that did not verify, by error kind
    pub static ref PROOF_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("cst_proof_failures_total", "Proofs that could not be verified"),
        &["kind"]  // root_mismatch, malformed_proof, upstream_unavailable, ...
    ).expect("metric creation failed");

    // =========================================================================
    // SCANS
    // =========================================================================

    /// Keyset pages requested
    pub static ref PAGES_FETCHED: IntCounter = IntCounter::new(
        "cst_pages_fetched_total",
        "Keyset pages requested from the index service"
    ).expect("metric creation failed");

    /// Items enumerated
    pub static ref ITEMS_SCANNED: IntCounter = IntCounter::new(
        "cst_items_scanned_total",
        "Items returned by partitioned scans"
    ).expect("metric creation failed");

    // =========================================================================
    // UPSTREAM
    // =========================================================================

    /// Requests that failed after retries
    pub static ref UPSTREAM_ERRORS: IntCounter = IntCounter::new(
        "cst_upstream_errors_total",
        "Ledger or index requests that failed after retries"
    ).expect("metric creation failed");

    /// Wall-clock duration of a verification pass or scan
    pub static ref PASS_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "cst_pass_duration_seconds",
            "Time spent on one tree verification or group scan"
        ).buckets(exponential_buckets(0.01, 2.0, 16).expect("valid buckets")),
        &["mode"]
    ).expect("metric creation failed");
}

/// Handle to the registered metrics.
#[derive(Clone)]
pub struct MetricsHandle {
    registry: Arc<Registry>,
}

impl MetricsHandle {
    /// Render every registered metric in Prometheus text format.
    pub fn encode(&self) -> Result<String, TelemetryError> {
        encode_registry(&self.registry)
    }
}

/// Register all metrics with the global registry.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(PROOFS_VERIFIED.clone()),
        Box::new(PROOF_FAILURES.clone()),
        Box::new(PAGES_FETCHED.clone()),
        Box::new(ITEMS_SCANNED.clone()),
        Box::new(UPSTREAM_ERRORS.clone()),
        Box::new(PASS_DURATION.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    encode_registry(&REGISTRY)
}

fn encode_registry(registry: &Registry) -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Count one failed proof under `kind`.
pub fn record_proof_failure(kind: &str) {
    PROOF_FAILURES.with_label_values(&[kind]).inc();
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }

    /// Start a pass timer labelled `mode`.
    pub fn pass(mode: &str) -> Self {
        Self::new(&PASS_DURATION.with_label_values(&[mode]))
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_twice_is_ok() {
        assert!(register_metrics().is_ok());
        assert!(register_metrics().is_ok());
    }

    #[test]
    fn test_failure_labels() {
        record_proof_failure("root_mismatch");
        record_proof_failure("root_mismatch");
        assert!(PROOF_FAILURES.with_label_values(&["root_mismatch"]).get() >= 2);
    }

    #[test]
    fn test_encode_contains_names() {
        let handle = register_metrics().unwrap();
        PROOFS_VERIFIED.inc();
        let text = handle.encode().unwrap();
        assert!(text.contains("cst_proofs_verified_total"));
    }

    #[test]
    fn test_pass_timer_observes() {
        {
            let _timer = HistogramTimer::pass("test");
        }
        assert!(PASS_DURATION.with_label_values(&["test"]).get_sample_count() >= 1);
    }
}
