//! PostgREST-backed job store.
//!
//! Talks to a hosted `prints` table using the PostgREST query conventions
//! (`column=eq.value` filters, `Prefer: return=representation` on writes).
//! The remote schema uses integer status and quality ids, so the mapping to
//! [`JobState`] is coarse for the inspection states: every state between
//! pickup and placement shares the "in inspection" id.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::RestStoreConfig;

use super::{
    CreateJobRequest, Job, JobError, JobFilter, JobState, JobStore, StatusUpdate, Verdict,
};

const STATUS_QUEUED: i64 = 1;
const STATUS_PRINTING: i64 = 2;
const STATUS_CANCELED: i64 = 3;
const STATUS_COMPLETED: i64 = 4;
const STATUS_FAILED: i64 = 5;
const STATUS_INSPECTION_PENDING: i64 = 6;
const STATUS_IN_INSPECTION: i64 = 7;

const QUALITY_GOOD: i64 = 1;
const QUALITY_BAD: i64 = 2;
const QUALITY_UNCERTAIN: i64 = 3;

/// Remote status id for a job state.
pub fn status_id(state: JobState) -> i64 {
    match state {
        JobState::Queued => STATUS_QUEUED,
        JobState::Printing => STATUS_PRINTING,
        JobState::AwaitingPickup => STATUS_INSPECTION_PENDING,
        JobState::Capturing | JobState::Analyzing | JobState::AwaitingPlacement => {
            STATUS_IN_INSPECTION
        }
        JobState::Completed => STATUS_COMPLETED,
        JobState::Failed => STATUS_FAILED,
    }
}

/// Job state for a remote status id. Cancelled rows have no counterpart.
pub fn state_from_status_id(id: i64) -> Option<JobState> {
    match id {
        STATUS_QUEUED => Some(JobState::Queued),
        STATUS_PRINTING => Some(JobState::Printing),
        STATUS_INSPECTION_PENDING => Some(JobState::AwaitingPickup),
        STATUS_IN_INSPECTION => Some(JobState::Capturing),
        STATUS_COMPLETED => Some(JobState::Completed),
        STATUS_FAILED => Some(JobState::Failed),
        STATUS_CANCELED => None,
        _ => None,
    }
}

/// Remote quality status id for a verdict.
pub fn quality_status_id(verdict: Verdict) -> i64 {
    match verdict {
        Verdict::Good => QUALITY_GOOD,
        Verdict::Bad => QUALITY_BAD,
        Verdict::Uncertain => QUALITY_UNCERTAIN,
    }
}

fn verdict_from_quality_id(id: i64) -> Option<Verdict> {
    match id {
        QUALITY_GOOD => Some(Verdict::Good),
        QUALITY_BAD => Some(Verdict::Bad),
        QUALITY_UNCERTAIN => Some(Verdict::Uncertain),
        _ => None,
    }
}

/// A row of the remote `prints` table.
#[derive(Debug, Deserialize)]
struct PrintRow {
    id: Value,
    #[serde(default)]
    title: Option<String>,
    status: i64,
    #[serde(default)]
    quality_score: Option<f64>,
    #[serde(default)]
    quality_status_id: Option<i64>,
    #[serde(default)]
    object_image_url: Option<String>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl PrintRow {
    fn into_job(self) -> Result<Job, JobError> {
        let id = match self.id {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            other => return Err(JobError::Remote(format!("unsupported id value: {}", other))),
        };
        let state = state_from_status_id(self.status).ok_or_else(|| {
            JobError::Remote(format!("job {} has unknown status id {}", id, self.status))
        })?;
        let created_at = self.created_at.unwrap_or_else(Utc::now);

        Ok(Job {
            title: self.title.unwrap_or_default(),
            state,
            quality_score: self.quality_score,
            verdict: self.quality_status_id.and_then(verdict_from_quality_id),
            artifact_url: self.object_image_url,
            error: None,
            started_at: self.started_at,
            ended_at: self.ended_at,
            created_at,
            updated_at: created_at,
            id,
        })
    }
}

/// Job store backed by a PostgREST endpoint.
pub struct RestJobStore {
    client: Client,
    config: RestStoreConfig,
}

impl RestJobStore {
    /// Create a new REST job store.
    pub fn new(config: RestStoreConfig) -> Result<Self, JobError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| JobError::Remote(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn table_url(&self) -> String {
        format!(
            "{}/rest/v1/{}",
            self.config.url.trim_end_matches('/'),
            self.config.table
        )
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Vec<Job>, JobError> {
        let response = self.authorized(builder).send().await.map_err(|e| {
            if e.is_timeout() {
                JobError::Remote("request timed out".to_string())
            } else {
                JobError::Remote(e.to_string())
            }
        })?;
        Self::parse_rows(response).await
    }

    async fn parse_rows(response: Response) -> Result<Vec<Job>, JobError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(JobError::Remote(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let rows: Vec<PrintRow> = response
            .json()
            .await
            .map_err(|e| JobError::Remote(format!("invalid response body: {}", e)))?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            match row.into_job() {
                Ok(job) => jobs.push(job),
                Err(e) => warn!("Skipping unreadable job row: {}", e),
            }
        }
        Ok(jobs)
    }

    async fn patch(&self, filters: &[(&str, String)], body: Value) -> Result<Vec<Job>, JobError> {
        let builder = self
            .client
            .patch(self.table_url())
            .query(filters)
            .header("Prefer", "return=representation")
            .json(&body);
        self.send(builder).await
    }
}

#[async_trait]
impl JobStore for RestJobStore {
    fn name(&self) -> &str {
        "rest"
    }

    async fn create(&self, request: CreateJobRequest) -> Result<Job, JobError> {
        let builder = self
            .client
            .post(self.table_url())
            .header("Prefer", "return=representation")
            .json(&json!({ "title": request.title, "status": STATUS_QUEUED }));

        self.send(builder)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| JobError::Remote("insert returned no rows".to_string()))
    }

    async fn get(&self, id: &str) -> Result<Option<Job>, JobError> {
        let builder = self
            .client
            .get(self.table_url())
            .query(&[("select", "*".to_string()), ("id", format!("eq.{}", id))]);
        Ok(self.send(builder).await?.into_iter().next())
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, JobError> {
        let mut query = vec![
            ("select", "*".to_string()),
            ("order", "created_at.asc".to_string()),
            ("limit", filter.limit.to_string()),
            ("offset", filter.offset.to_string()),
        ];
        if let Some(state) = filter.state {
            query.push(("status", format!("eq.{}", status_id(state))));
        }

        debug!("Listing jobs from {}", self.table_url());
        let builder = self.client.get(self.table_url()).query(&query);
        self.send(builder).await
    }

    async fn update_status(&self, id: &str, update: StatusUpdate) -> Result<Job, JobError> {
        let mut body = Map::new();
        body.insert("status".to_string(), json!(status_id(update.state)));
        if let Some(started_at) = update.started_at {
            body.insert("started_at".to_string(), json!(started_at.to_rfc3339()));
        }

        let mut filters = vec![("id", format!("eq.{}", id))];
        if let Some(ended_at) = update.ended_at {
            body.insert("ended_at".to_string(), json!(ended_at.to_rfc3339()));
            // Only a job that has not ended yet may be ended.
            filters.push(("ended_at", "is.null".to_string()));
        }

        if let Some(job) = self.patch(&filters, Value::Object(body)).await?.into_iter().next() {
            return Ok(job);
        }

        match self.get(id).await? {
            Some(job) => Err(JobError::InvalidState {
                job_id: id.to_string(),
                current_state: job.state,
                operation: format!("move to {}", update.state),
            }),
            None => Err(JobError::NotFound(id.to_string())),
        }
    }

    async fn update_quality(
        &self,
        id: &str,
        score: f64,
        verdict: Verdict,
        artifact_url: &str,
    ) -> Result<Job, JobError> {
        let body = json!({
            "quality_score": score,
            "quality_status_id": quality_status_id(verdict),
            "object_image_url": artifact_url,
        });

        self.patch(&[("id", format!("eq.{}", id))], body)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    async fn requeue(&self, id: &str) -> Result<Job, JobError> {
        let body = json!({
            "status": STATUS_QUEUED,
            "quality_score": null,
            "quality_status_id": null,
            "object_image_url": null,
            "started_at": null,
            "ended_at": null,
        });
        let filters = [
            ("id", format!("eq.{}", id)),
            ("status", format!("eq.{}", STATUS_FAILED)),
        ];

        if let Some(job) = self.patch(&filters, body).await?.into_iter().next() {
            return Ok(job);
        }

        match self.get(id).await? {
            Some(job) => Err(JobError::InvalidState {
                job_id: id.to_string(),
                current_state: job.state,
                operation: "requeue".to_string(),
            }),
            None => Err(JobError::NotFound(id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer) -> RestJobStore {
        RestJobStore::new(RestStoreConfig {
            url: server.uri(),
            api_key: "anon-key".to_string(),
            table: "prints".to_string(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn row(id: i64, title: &str, status: i64) -> Value {
        json!({
            "id": id,
            "title": title,
            "status": status,
            "created_at": "2026-01-01T10:00:00+00:00"
        })
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_id(JobState::Queued), 1);
        assert_eq!(status_id(JobState::Printing), 2);
        assert_eq!(status_id(JobState::AwaitingPickup), 6);
        assert_eq!(status_id(JobState::Analyzing), 7);
        assert_eq!(status_id(JobState::Completed), 4);
        assert_eq!(status_id(JobState::Failed), 5);
        assert_eq!(state_from_status_id(3), None);
        assert_eq!(state_from_status_id(5), Some(JobState::Failed));
        assert_eq!(quality_status_id(Verdict::Uncertain), 3);
    }

    #[tokio::test]
    async fn test_list_queued_filters_by_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/prints"))
            .and(query_param("status", "eq.1"))
            .and(header("apikey", "anon-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([row(7, "Part A", 1), row(8, "Part B", 1)])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let jobs = store_for(&server).list_queued().await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, "7");
        assert_eq!(jobs[0].title, "Part A");
        assert_eq!(jobs[0].state, JobState::Queued);
    }

    #[tokio::test]
    async fn test_list_skips_cancelled_rows() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/prints"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([row(1, "A", 3), row(2, "B", 4)])),
            )
            .mount(&server)
            .await;

        let jobs = store_for(&server).list(&JobFilter::new()).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].state, JobState::Completed);
    }

    #[tokio::test]
    async fn test_update_status_sends_status_id() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/prints"))
            .and(query_param("id", "eq.7"))
            .and(body_partial_json(json!({ "status": 2 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([row(7, "A", 2)])))
            .expect(1)
            .mount(&server)
            .await;

        let job = store_for(&server)
            .update_status(
                "7",
                StatusUpdate::new(JobState::Printing).with_started_at(Utc::now()),
            )
            .await
            .unwrap();
        assert_eq!(job.state, JobState::Printing);
    }

    #[tokio::test]
    async fn test_terminal_update_guards_ended_at() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/prints"))
            .and(query_param("ended_at", "is.null"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/prints"))
            .and(query_param("id", "eq.7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([row(7, "A", 5)])))
            .mount(&server)
            .await;

        let result = store_for(&server)
            .update_status(
                "7",
                StatusUpdate::new(JobState::Failed).with_ended_at(Utc::now()),
            )
            .await;
        assert!(matches!(result, Err(JobError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_update_quality_maps_verdict() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/prints"))
            .and(body_partial_json(json!({
                "quality_score": 95.0,
                "quality_status_id": 1,
                "object_image_url": "https://cdn/x.jpg"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": 7,
                "title": "A",
                "status": 7,
                "quality_score": 95.0,
                "quality_status_id": 1,
                "object_image_url": "https://cdn/x.jpg"
            }])))
            .expect(1)
            .mount(&server)
            .await;

        let job = store_for(&server)
            .update_quality("7", 95.0, Verdict::Good, "https://cdn/x.jpg")
            .await
            .unwrap();
        assert_eq!(job.verdict, Some(Verdict::Good));
        assert_eq!(job.quality_score, Some(95.0));
    }

    #[tokio::test]
    async fn test_server_error_is_remote_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .mount(&server)
            .await;

        let result = store_for(&server).list_queued().await;
        assert!(matches!(result, Err(JobError::Remote(_))));
    }
}
