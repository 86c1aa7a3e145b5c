//! Prometheus metrics exposition
//!
//! Request-level metrics recorded by the router middleware:
//!
//! - `dispenser_requests_total` (counter): labels `path`, `status`
//! - `dispenser_request_duration_seconds` (histogram): label `path`
//!
//! The core crates additionally emit `pool_checkouts_total`,
//! `pool_adds_total`, `pool_restores_total`, `pool_stock`,
//! `version_fetches_total` and `version_force_refreshes_total` through the
//! same recorder.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering.
///
/// Histogram buckets make `dispenser_request_duration_seconds` render with
/// `_bucket` lines for `histogram_quantile()` queries instead of the
/// default summary. The range covers fast in-memory reads up to the 10s
/// version fetch timeout.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full(
                "dispenser_request_duration_seconds".to_string(),
            ),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )
        .expect("failed to set histogram buckets")
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record one handled request.
pub fn record_request(path: &str, status: u16, duration_secs: f64) {
    metrics::counter!(
        "dispenser_requests_total",
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("dispenser_request_duration_seconds", "path" => path.to_string())
        .record(duration_secs);
}
