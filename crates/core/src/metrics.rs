//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Jobs (terminal outcomes, processing duration)
//! - Device link (connections, commands, acknowledgement waits)
//! - Collaborators (inspector, uploader)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Jobs
// =============================================================================

/// Jobs that reached a terminal state, by outcome.
pub static JOBS_PROCESSED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("printsort_jobs_processed_total", "Jobs processed to a terminal state"),
        &["outcome"], // "completed", "failed"
    )
    .unwrap()
});

/// Job failures by kind.
pub static JOB_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("printsort_job_failures_total", "Job failures by kind"),
        &["kind"],
    )
    .unwrap()
});

/// End-to-end processing time of one job.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "printsort_job_duration_seconds",
            "Time from dequeue to terminal state",
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        &["outcome"],
    )
    .unwrap()
});

// =============================================================================
// Device link
// =============================================================================

/// Controller connection attempts by result.
pub static DEVICE_CONNECTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "printsort_device_connections_total",
            "Robot controller connection attempts",
        ),
        &["result"], // "accepted", "rejected"
    )
    .unwrap()
});

/// Commands sent to the controller by command verb and outcome.
pub static DEVICE_COMMANDS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("printsort_device_commands_total", "Robot controller commands"),
        &["command", "outcome"], // outcome: "matched", "mismatched", "timed_out", "send_failed"
    )
    .unwrap()
});

/// Time spent waiting for an acknowledgement.
pub static ACK_WAIT_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "printsort_ack_wait_seconds",
            "Time spent waiting for controller acknowledgements",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["command"],
    )
    .unwrap()
});

/// Messages received while no matching acknowledgement was expected.
pub static UNEXPECTED_MESSAGES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "printsort_unexpected_messages_total",
            "Controller messages that did not match the awaited acknowledgement",
        ),
        &["command"],
    )
    .unwrap()
});

// =============================================================================
// Collaborators
// =============================================================================

/// Collaborator call duration (inspector capture/analyze, upload).
pub static COLLABORATOR_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "printsort_collaborator_duration_seconds",
            "Duration of inspector and uploader calls",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["operation", "result"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Jobs
        Box::new(JOBS_PROCESSED.clone()),
        Box::new(JOB_FAILURES.clone()),
        Box::new(JOB_DURATION.clone()),
        // Device
        Box::new(DEVICE_CONNECTIONS.clone()),
        Box::new(DEVICE_COMMANDS.clone()),
        Box::new(ACK_WAIT_DURATION.clone()),
        Box::new(UNEXPECTED_MESSAGES.clone()),
        // Collaborators
        Box::new(COLLABORATOR_DURATION.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Registry;

    #[test]
    fn test_all_metrics_register_once() {
        let registry = Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }

        DEVICE_CONNECTIONS.with_label_values(&["accepted"]).inc();
        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|f| f.get_name().to_string())
            .collect();
        assert!(names.contains(&"printsort_device_connections_total".to_string()));
    }
}
