//! Job storage trait and types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{Job, JobState, Verdict};

/// Error type for job store operations.
#[derive(Debug, Error)]
pub enum JobError {
    /// Job not found.
    #[error("job not found: {0}")]
    NotFound(String),

    /// Cannot perform operation due to current state.
    #[error("cannot {operation} job {job_id}: current state is {current_state}")]
    InvalidState {
        job_id: String,
        current_state: JobState,
        operation: String,
    },

    /// Local database error.
    #[error("database error: {0}")]
    Database(String),

    /// Remote store error (transport or non-success response).
    #[error("remote store error: {0}")]
    Remote(String),
}

/// Request to create a new queued job.
#[derive(Debug, Clone)]
pub struct CreateJobRequest {
    /// Display title.
    pub title: String,
}

/// A status transition to persist.
///
/// `started_at` and `ended_at` are only written when present; existing
/// values are left untouched otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub state: JobState,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl StatusUpdate {
    pub fn new(state: JobState) -> Self {
        Self {
            state,
            started_at: None,
            ended_at: None,
            error: None,
        }
    }

    pub fn with_started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn with_ended_at(mut self, at: DateTime<Utc>) -> Self {
        self.ended_at = Some(at);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Filter for querying jobs.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Filter by state.
    pub state: Option<JobState>,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl JobFilter {
    /// Create a new filter with defaults.
    pub fn new() -> Self {
        Self {
            state: None,
            limit: 100,
            offset: 0,
        }
    }

    /// Filter by state.
    pub fn with_state(mut self, state: JobState) -> Self {
        self.state = Some(state);
        self
    }

    /// Set limit.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Set offset.
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Trait for job storage backends.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Create a new job in the `Queued` state.
    async fn create(&self, request: CreateJobRequest) -> Result<Job, JobError>;

    /// Get a job by ID.
    async fn get(&self, id: &str) -> Result<Option<Job>, JobError>;

    /// List jobs matching the filter.
    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, JobError>;

    /// Persist a state transition.
    async fn update_status(&self, id: &str, update: StatusUpdate) -> Result<Job, JobError>;

    /// Record the quality analysis result and the artifact URL.
    async fn update_quality(
        &self,
        id: &str,
        score: f64,
        verdict: Verdict,
        artifact_url: &str,
    ) -> Result<Job, JobError>;

    /// Put a failed job back in the queue (operator intervention).
    async fn requeue(&self, id: &str) -> Result<Job, JobError>;

    /// All jobs currently waiting in the queue.
    async fn list_queued(&self) -> Result<Vec<Job>, JobError> {
        self.list(&JobFilter::new().with_state(JobState::Queued))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_update_builder() {
        let now = Utc::now();
        let update = StatusUpdate::new(JobState::Failed)
            .with_ended_at(now)
            .with_error("pickup timed out");
        assert_eq!(update.state, JobState::Failed);
        assert_eq!(update.ended_at, Some(now));
        assert!(update.started_at.is_none());
        assert_eq!(update.error.as_deref(), Some("pickup timed out"));
    }

    #[test]
    fn test_filter_defaults() {
        let filter = JobFilter::new();
        assert!(filter.state.is_none());
        assert_eq!(filter.limit, 100);
        assert_eq!(filter.offset, 0);

        let filter = JobFilter::new().with_state(JobState::Queued).with_limit(5);
        assert_eq!(filter.state, Some(JobState::Queued));
        assert_eq!(filter.limit, 5);
    }

    #[test]
    fn test_error_display() {
        let err = JobError::NotFound("job-9".to_string());
        assert_eq!(err.to_string(), "job not found: job-9");

        let err = JobError::InvalidState {
            job_id: "job-9".to_string(),
            current_state: JobState::Printing,
            operation: "requeue".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "cannot requeue job job-9: current state is printing"
        );
    }
}
