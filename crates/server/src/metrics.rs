//! Prometheus metrics for observability.
//!
//! HTTP request metrics live here; job, device and collaborator metrics are
//! defined in the core crate and registered alongside. Link and poll-loop
//! gauges are collected when `/metrics` is scraped.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

use crate::state::AppState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "printsort_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("printsort_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "printsort_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Dynamic gauges
// =============================================================================

/// Robot controller connected (1) or not (0).
pub static DEVICE_LINK_UP: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "printsort_device_link_up",
        "Whether a robot controller is connected (1) or not (0)",
    )
    .unwrap()
});

/// Poll loop running state (1 = running, 0 = stopped).
pub static POLL_LOOP_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "printsort_poll_loop_running",
        "Whether the poll loop is running (1) or stopped (0)",
    )
    .unwrap()
});

/// A job is currently being driven (1) or not (0).
pub static JOB_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "printsort_job_in_flight",
        "Whether a job is currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Dynamic
    registry.register(Box::new(DEVICE_LINK_UP.clone())).unwrap();
    registry
        .register(Box::new(POLL_LOOP_RUNNING.clone()))
        .unwrap();
    registry.register(Box::new(JOB_IN_FLIGHT.clone())).unwrap();

    // Core metrics (jobs, device, collaborators)
    for metric in printsort_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Update gauges from current application state before encoding.
pub async fn collect_dynamic_metrics(state: &AppState) {
    DEVICE_LINK_UP.set(i64::from(state.link().is_live()));

    match state.poll_loop() {
        Some(poll_loop) => {
            let status = poll_loop.status().await;
            POLL_LOOP_RUNNING.set(i64::from(status.running));
            JOB_IN_FLIGHT.set(i64::from(status.current_job.is_some()));
        }
        None => {
            POLL_LOOP_RUNNING.set(0);
            JOB_IN_FLIGHT.set(0);
        }
    }
}

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| if is_identifier(segment) { "{id}" } else { segment })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_identifier(segment: &str) -> bool {
    if segment.is_empty() {
        return false;
    }
    if segment.bytes().all(|b| b.is_ascii_digit()) {
        return true;
    }
    // UUID: 8-4-4-4-12 hex groups
    let groups: Vec<&str> = segment.split('-').collect();
    groups.len() == 5
        && groups
            .iter()
            .zip([8, 4, 4, 4, 12])
            .all(|(g, len)| g.len() == len && g.bytes().all(|b| b.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/api/v1/jobs/550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(normalize_path(path), "/api/v1/jobs/{id}");
    }

    #[test]
    fn test_normalize_path_numeric_middle() {
        let path = "/api/v1/jobs/12345/requeue";
        assert_eq!(normalize_path(path), "/api/v1/jobs/{id}/requeue");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        assert_eq!(normalize_path("/api/v1/health"), "/api/v1/health");
        assert_eq!(normalize_path("/api/v1"), "/api/v1");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();
        DEVICE_LINK_UP.set(0);

        let output = encode_metrics();
        assert!(output.contains("printsort_http_requests_total"));
        assert!(output.contains("printsort_device_link_up"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_includes_core_metrics() {
        printsort_core::metrics::JOBS_PROCESSED
            .with_label_values(&["completed"])
            .inc_by(0);

        let output = encode_metrics();
        assert!(output.contains("printsort_jobs_processed_total"));
    }
}
