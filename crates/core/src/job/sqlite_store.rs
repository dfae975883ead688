//! SQLite-backed job store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    CreateJobRequest, Job, JobError, JobFilter, JobState, JobStore, StatusUpdate, Verdict,
};

const SELECT_COLUMNS: &str = "SELECT id, title, state, quality_score, verdict, artifact_url, error, started_at, ended_at, created_at, updated_at FROM jobs";

/// SQLite-backed job store.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Create a new SQLite job store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, JobError> {
        let conn = Connection::open(path).map_err(|e| JobError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite job store (useful for testing).
    pub fn in_memory() -> Result<Self, JobError> {
        let conn = Connection::open_in_memory().map_err(|e| JobError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), JobError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                state TEXT NOT NULL,
                quality_score REAL,
                verdict TEXT,
                artifact_url TEXT,
                error TEXT,
                started_at TEXT,
                ended_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_state ON jobs(state);
            CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at);
            "#,
        )
        .map_err(|e| JobError::Database(e.to_string()))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, JobError> {
        self.conn
            .lock()
            .map_err(|_| JobError::Database("connection mutex poisoned".to_string()))
    }

    fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
        value
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
        let state_str: String = row.get(2)?;
        let verdict_str: Option<String> = row.get(4)?;
        let created_at: String = row.get(9)?;
        let updated_at: String = row.get(10)?;

        // A state we cannot parse means the row was written by something else.
        let state = state_str.parse::<JobState>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                e.into(),
            )
        })?;

        Ok(Job {
            id: row.get(0)?,
            title: row.get(1)?,
            state,
            quality_score: row.get(3)?,
            verdict: verdict_str.and_then(|v| v.parse::<Verdict>().ok()),
            artifact_url: row.get(5)?,
            error: row.get(6)?,
            started_at: Self::parse_timestamp(row.get(7)?),
            ended_at: Self::parse_timestamp(row.get(8)?),
            created_at: Self::parse_timestamp(Some(created_at)).unwrap_or_else(Utc::now),
            updated_at: Self::parse_timestamp(Some(updated_at)).unwrap_or_else(Utc::now),
        })
    }

    fn fetch(conn: &Connection, id: &str) -> Result<Job, JobError> {
        conn.query_row(
            &format!("{} WHERE id = ?", SELECT_COLUMNS),
            params![id],
            Self::row_to_job,
        )
        .optional()
        .map_err(|e| JobError::Database(e.to_string()))?
        .ok_or_else(|| JobError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create(&self, request: CreateJobRequest) -> Result<Job, JobError> {
        let conn = self.conn()?;

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO jobs (id, title, state, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
            params![
                id,
                request.title,
                JobState::Queued.as_str(),
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| JobError::Database(e.to_string()))?;

        Ok(Job {
            id,
            title: request.title,
            state: JobState::Queued,
            quality_score: None,
            verdict: None,
            artifact_url: None,
            error: None,
            started_at: None,
            ended_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get(&self, id: &str) -> Result<Option<Job>, JobError> {
        let conn = self.conn()?;
        match Self::fetch(&conn, id) {
            Ok(job) => Ok(Some(job)),
            Err(JobError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, JobError> {
        let conn = self.conn()?;

        let mut sql = SELECT_COLUMNS.to_string();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(state) = filter.state {
            sql.push_str(" WHERE state = ?");
            values.push(Box::new(state.as_str()));
        }
        sql.push_str(" ORDER BY created_at ASC, rowid ASC LIMIT ? OFFSET ?");
        values.push(Box::new(filter.limit));
        values.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| JobError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_job)
            .map_err(|e| JobError::Database(e.to_string()))?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row.map_err(|e| JobError::Database(e.to_string()))?);
        }
        Ok(jobs)
    }

    async fn update_status(&self, id: &str, update: StatusUpdate) -> Result<Job, JobError> {
        let conn = self.conn()?;
        let current = Self::fetch(&conn, id)?;

        if !current.state.can_transition_to(update.state) {
            return Err(JobError::InvalidState {
                job_id: id.to_string(),
                current_state: current.state,
                operation: format!("move to {}", update.state),
            });
        }

        let now = Utc::now();
        // ended_at is written once; a second terminal write keeps the first value.
        conn.execute(
            "UPDATE jobs SET state = ?, started_at = COALESCE(?, started_at), ended_at = COALESCE(ended_at, ?), error = COALESCE(?, error), updated_at = ? WHERE id = ?",
            params![
                update.state.as_str(),
                update.started_at.map(|t| t.to_rfc3339()),
                update.ended_at.map(|t| t.to_rfc3339()),
                update.error,
                now.to_rfc3339(),
                id,
            ],
        )
        .map_err(|e| JobError::Database(e.to_string()))?;

        Self::fetch(&conn, id)
    }

    async fn update_quality(
        &self,
        id: &str,
        score: f64,
        verdict: Verdict,
        artifact_url: &str,
    ) -> Result<Job, JobError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE jobs SET quality_score = ?, verdict = ?, artifact_url = ?, updated_at = ? WHERE id = ?",
                params![
                    score,
                    verdict.as_str(),
                    artifact_url,
                    Utc::now().to_rfc3339(),
                    id
                ],
            )
            .map_err(|e| JobError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(JobError::NotFound(id.to_string()));
        }
        Self::fetch(&conn, id)
    }

    async fn requeue(&self, id: &str) -> Result<Job, JobError> {
        let conn = self.conn()?;
        let current = Self::fetch(&conn, id)?;

        if current.state != JobState::Failed {
            return Err(JobError::InvalidState {
                job_id: id.to_string(),
                current_state: current.state,
                operation: "requeue".to_string(),
            });
        }

        conn.execute(
            "UPDATE jobs SET state = ?, quality_score = NULL, verdict = NULL, artifact_url = NULL, error = NULL, started_at = NULL, ended_at = NULL, updated_at = ? WHERE id = ?",
            params![JobState::Queued.as_str(), Utc::now().to_rfc3339(), id],
        )
        .map_err(|e| JobError::Database(e.to_string()))?;

        Self::fetch(&conn, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store() -> SqliteJobStore {
        SqliteJobStore::in_memory().unwrap()
    }

    async fn create_job(store: &SqliteJobStore, title: &str) -> Job {
        store
            .create(CreateJobRequest {
                title: title.to_string(),
            })
            .await
            .unwrap()
    }

    async fn advance(store: &SqliteJobStore, id: &str, to: JobState) {
        let mut state = store.get(id).await.unwrap().unwrap().state;
        while state != to {
            let next = state.next().unwrap();
            store.update_status(id, StatusUpdate::new(next)).await.unwrap();
            state = next;
        }
    }

    #[tokio::test]
    async fn test_create_job() {
        let store = create_test_store();
        let job = create_job(&store, "Part A").await;

        assert!(!job.id.is_empty());
        assert_eq!(job.title, "Part A");
        assert_eq!(job.state, JobState::Queued);
        assert!(job.started_at.is_none());
        assert!(job.ended_at.is_none());
    }

    #[tokio::test]
    async fn test_get_missing_job() {
        let store = create_test_store();
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_queued_in_creation_order() {
        let store = create_test_store();
        let a = create_job(&store, "A").await;
        let b = create_job(&store, "B").await;
        let c = create_job(&store, "C").await;
        advance(&store, &b.id, JobState::Printing).await;

        let queued = store.list_queued().await.unwrap();
        let ids: Vec<_> = queued.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec![a.id.as_str(), c.id.as_str()]);

        let all = store.list(&JobFilter::new()).await.unwrap();
        assert_eq!(all.len(), 3);

        let page = store
            .list(&JobFilter::new().with_limit(1).with_offset(1))
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, b.id);
    }

    #[tokio::test]
    async fn test_update_status_sets_started_at() {
        let store = create_test_store();
        let job = create_job(&store, "A").await;
        let now = Utc::now();

        let updated = store
            .update_status(
                &job.id,
                StatusUpdate::new(JobState::Printing).with_started_at(now),
            )
            .await
            .unwrap();

        assert_eq!(updated.state, JobState::Printing);
        assert!(updated.started_at.is_some());
        assert!(updated.ended_at.is_none());
    }

    #[tokio::test]
    async fn test_update_status_rejects_invalid_transition() {
        let store = create_test_store();
        let job = create_job(&store, "A").await;

        let result = store
            .update_status(&job.id, StatusUpdate::new(JobState::Capturing))
            .await;
        assert!(matches!(result, Err(JobError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_terminal_state_is_final() {
        let store = create_test_store();
        let job = create_job(&store, "A").await;
        advance(&store, &job.id, JobState::Printing).await;

        let failed = store
            .update_status(
                &job.id,
                StatusUpdate::new(JobState::Failed)
                    .with_ended_at(Utc::now())
                    .with_error("boom"),
            )
            .await
            .unwrap();
        assert_eq!(failed.state, JobState::Failed);
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert!(failed.ended_at.is_some());

        let again = store
            .update_status(
                &job.id,
                StatusUpdate::new(JobState::Failed).with_ended_at(Utc::now()),
            )
            .await;
        assert!(matches!(again, Err(JobError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_update_quality_keeps_job_open() {
        let store = create_test_store();
        let job = create_job(&store, "A").await;
        advance(&store, &job.id, JobState::Analyzing).await;

        let updated = store
            .update_quality(&job.id, 95.0, Verdict::Good, "https://cdn/a.jpg")
            .await
            .unwrap();

        assert_eq!(updated.quality_score, Some(95.0));
        assert_eq!(updated.verdict, Some(Verdict::Good));
        assert_eq!(updated.artifact_url.as_deref(), Some("https://cdn/a.jpg"));
        assert!(updated.ended_at.is_none());
        assert_eq!(updated.state, JobState::Analyzing);
    }

    #[tokio::test]
    async fn test_update_quality_missing_job() {
        let store = create_test_store();
        let result = store
            .update_quality("nope", 1.0, Verdict::Bad, "u")
            .await;
        assert!(matches!(result, Err(JobError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_requeue_only_from_failed() {
        let store = create_test_store();
        let job = create_job(&store, "A").await;

        let result = store.requeue(&job.id).await;
        assert!(matches!(result, Err(JobError::InvalidState { .. })));

        store
            .update_status(
                &job.id,
                StatusUpdate::new(JobState::Failed)
                    .with_ended_at(Utc::now())
                    .with_error("no device"),
            )
            .await
            .unwrap();

        let requeued = store.requeue(&job.id).await.unwrap();
        assert_eq!(requeued.state, JobState::Queued);
        assert!(requeued.error.is_none());
        assert!(requeued.ended_at.is_none());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("jobs.db");

        let id = {
            let store = SqliteJobStore::new(&path).unwrap();
            create_job(&store, "Persistent").await.id
        };

        let store = SqliteJobStore::new(&path).unwrap();
        let job = store.get(&id).await.unwrap().unwrap();
        assert_eq!(job.title, "Persistent");
    }
}
