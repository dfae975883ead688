//! Job records and the stores that persist them.

mod rest_store;
mod sqlite_store;
mod store;
mod types;

pub use rest_store::{quality_status_id, state_from_status_id, status_id, RestJobStore};
pub use sqlite_store::SqliteJobStore;
pub use store::{CreateJobRequest, JobError, JobFilter, JobStore, StatusUpdate};
pub use types::{Job, JobState, Verdict};
