//! Poll loop configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the job poll loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Enable/disable the poll loop.
    /// When disabled, jobs stay queued until it is enabled again.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Back-off while no robot controller is connected (milliseconds).
    /// The store is not queried during this time.
    #[serde(default = "default_link_retry_interval")]
    pub link_retry_interval_ms: u64,

    /// Back-off when no jobs are queued (milliseconds).
    #[serde(default = "default_idle_poll_interval")]
    pub idle_poll_interval_ms: u64,

    /// Pause after every processed job, whatever its outcome (milliseconds).
    #[serde(default = "default_inter_job_delay")]
    pub inter_job_delay_ms: u64,

    /// Simulated print time between "printing" and "awaiting pickup" (milliseconds).
    #[serde(default = "default_print_duration")]
    pub print_duration_ms: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_link_retry_interval() -> u64 {
    5000 // 5 seconds
}

fn default_idle_poll_interval() -> u64 {
    10000 // 10 seconds
}

fn default_inter_job_delay() -> u64 {
    5000 // 5 seconds
}

fn default_print_duration() -> u64 {
    30000 // 30 seconds
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            link_retry_interval_ms: default_link_retry_interval(),
            idle_poll_interval_ms: default_idle_poll_interval(),
            inter_job_delay_ms: default_inter_job_delay(),
            print_duration_ms: default_print_duration(),
        }
    }
}
