//! Job API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use printsort_core::{CreateJobRequest, Job, JobError, JobFilter, JobState};

use crate::state::AppState;

/// Maximum allowed limit for job queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for job queries
const DEFAULT_LIMIT: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for creating a job
#[derive(Debug, Deserialize)]
pub struct CreateJobBody {
    pub title: String,
}

/// Query parameters for listing jobs
#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    /// Filter by state (e.g. "queued", "failed")
    pub state: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<Job>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

impl From<JobError> for ErrorResponse {
    fn from(e: JobError) -> Self {
        Self {
            error: e.to_string(),
        }
    }
}

fn store_error(e: JobError) -> ApiError {
    let status = match e {
        JobError::NotFound(_) => StatusCode::NOT_FOUND,
        JobError::InvalidState { .. } => StatusCode::CONFLICT,
        JobError::Remote(_) => StatusCode::BAD_GATEWAY,
        JobError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse::from(e)))
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a new queued job
pub async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateJobBody>,
) -> Result<(StatusCode, Json<Job>), ApiError> {
    let title = body.title.trim();
    if title.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "title must not be empty"));
    }

    let job = state
        .store()
        .create(CreateJobRequest {
            title: title.to_string(),
        })
        .await
        .map_err(store_error)?;

    tracing::info!(job_id = %job.id, title = %job.title, "Job queued via API");
    Ok((StatusCode::CREATED, Json(job)))
}

/// Get a job by ID
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    match state.store().get(&id).await {
        Ok(Some(job)) => Ok(Json(job)),
        Ok(None) => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Job not found: {}", id),
        )),
        Err(e) => Err(store_error(e)),
    }
}

/// List jobs with optional filters
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<ListJobsResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = JobFilter::new().with_limit(limit).with_offset(offset);

    if let Some(ref state_filter) = params.state {
        let job_state = state_filter.parse::<JobState>().map_err(|_| {
            api_error(
                StatusCode::BAD_REQUEST,
                format!("Unknown job state: {}", state_filter),
            )
        })?;
        filter = filter.with_state(job_state);
    }

    let jobs = state.store().list(&filter).await.map_err(store_error)?;

    Ok(Json(ListJobsResponse {
        jobs,
        limit,
        offset,
    }))
}

/// Put a failed job back in the queue
pub async fn requeue_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    let job = state.store().requeue(&id).await.map_err(store_error)?;
    tracing::info!(job_id = %job.id, "Job requeued via API");
    Ok(Json(job))
}
