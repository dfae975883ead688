//! Mock job store for testing.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::job::{
    CreateJobRequest, Job, JobError, JobFilter, JobState, JobStore, StatusUpdate, Verdict,
};

/// In-memory [`JobStore`] that records every status write.
///
/// Applies the same transition rules as the real stores, so tests catch
/// illegal transitions.
///
/// # Example
///
/// ```rust,ignore
/// use printsort_core::testing::MockJobStore;
///
/// let store = MockJobStore::new();
/// let job = store.insert_queued("Part A").await;
///
/// // ... drive the job ...
///
/// assert_eq!(store.recorded_states(&job.id).await.last(), Some(&JobState::Completed));
/// ```
#[derive(Debug, Default)]
pub struct MockJobStore {
    jobs: Arc<RwLock<Vec<Job>>>,
    /// (job id, new state) for every successful `update_status`.
    transitions: Arc<RwLock<Vec<(String, JobState)>>>,
    /// If set, the next call fails with this message.
    next_error: Arc<RwLock<Option<String>>>,
    /// Writes moving a job into this state always fail.
    rejected_state: Arc<RwLock<Option<(JobState, String)>>>,
    list_calls: AtomicUsize,
    next_id: AtomicUsize,
}

impl MockJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a queued job and return it.
    pub async fn insert_queued(&self, title: &str) -> Job {
        let id = (self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string();
        let now = Utc::now();
        let job = Job {
            id,
            title: title.to_string(),
            state: JobState::Queued,
            quality_score: None,
            verdict: None,
            artifact_url: None,
            error: None,
            started_at: None,
            ended_at: None,
            created_at: now,
            updated_at: now,
        };
        self.jobs.write().await.push(job.clone());
        job
    }

    pub async fn get_job(&self, id: &str) -> Option<Job> {
        self.jobs.read().await.iter().find(|j| j.id == id).cloned()
    }

    /// States written for `id`, in order.
    pub async fn recorded_states(&self, id: &str) -> Vec<JobState> {
        self.transitions
            .read()
            .await
            .iter()
            .filter(|(job_id, _)| job_id == id)
            .map(|(_, state)| *state)
            .collect()
    }

    /// How many times jobs were listed.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Configure the next call to fail.
    pub async fn set_next_error(&self, message: &str) {
        *self.next_error.write().await = Some(message.to_string());
    }

    /// Make every write into `state` fail with `message`.
    pub async fn reject_state(&self, state: JobState, message: &str) {
        *self.rejected_state.write().await = Some((state, message.to_string()));
    }

    async fn check_error(&self) -> Result<(), JobError> {
        match self.next_error.write().await.take() {
            Some(message) => Err(JobError::Database(message)),
            None => Ok(()),
        }
    }

    async fn modify<F>(&self, id: &str, f: F) -> Result<Job, JobError>
    where
        F: FnOnce(&mut Job) -> Result<(), JobError>,
    {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;
        f(job)?;
        job.updated_at = Utc::now();
        Ok(job.clone())
    }
}

#[async_trait]
impl JobStore for MockJobStore {
    fn name(&self) -> &str {
        "mock"
    }

    async fn create(&self, request: CreateJobRequest) -> Result<Job, JobError> {
        self.check_error().await?;
        Ok(self.insert_queued(&request.title).await)
    }

    async fn get(&self, id: &str) -> Result<Option<Job>, JobError> {
        self.check_error().await?;
        Ok(self.get_job(id).await)
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, JobError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check_error().await?;
        Ok(self
            .jobs
            .read()
            .await
            .iter()
            .filter(|j| filter.state.is_none_or(|s| j.state == s))
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn update_status(&self, id: &str, update: StatusUpdate) -> Result<Job, JobError> {
        self.check_error().await?;
        let state = update.state;
        if let Some((rejected, message)) = self.rejected_state.read().await.as_ref() {
            if *rejected == state {
                return Err(JobError::Database(message.clone()));
            }
        }
        let job = self
            .modify(id, |job| {
                if !job.state.can_transition_to(state) {
                    return Err(JobError::InvalidState {
                        job_id: job.id.clone(),
                        current_state: job.state,
                        operation: format!("move to {}", state),
                    });
                }
                job.state = state;
                if update.started_at.is_some() {
                    job.started_at = update.started_at;
                }
                if job.ended_at.is_none() {
                    job.ended_at = update.ended_at;
                }
                if update.error.is_some() {
                    job.error = update.error;
                }
                Ok(())
            })
            .await?;
        self.transitions
            .write()
            .await
            .push((id.to_string(), state));
        Ok(job)
    }

    async fn update_quality(
        &self,
        id: &str,
        score: f64,
        verdict: Verdict,
        artifact_url: &str,
    ) -> Result<Job, JobError> {
        self.check_error().await?;
        self.modify(id, |job| {
            job.quality_score = Some(score);
            job.verdict = Some(verdict);
            job.artifact_url = Some(artifact_url.to_string());
            Ok(())
        })
        .await
    }

    async fn requeue(&self, id: &str) -> Result<Job, JobError> {
        self.check_error().await?;
        self.modify(id, |job| {
            if job.state != JobState::Failed {
                return Err(JobError::InvalidState {
                    job_id: job.id.clone(),
                    current_state: job.state,
                    operation: "requeue".to_string(),
                });
            }
            job.state = JobState::Queued;
            job.quality_score = None;
            job.verdict = None;
            job.artifact_url = None;
            job.error = None;
            job.started_at = None;
            job.ended_at = None;
            Ok(())
        })
        .await
    }
}
