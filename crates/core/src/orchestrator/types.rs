//! Types for the job orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device::{Command, ExpectOutcome, LinkError};
use crate::inspection::QualityReport;
use crate::job::{JobError, JobState};

/// Why a job ended in `Failed`.
#[derive(Debug, Error)]
pub enum JobFailure {
    /// No controller was connected when a command had to go out.
    #[error("robot controller not connected")]
    LinkUnavailable,

    /// Writing the command failed; the session was torn down.
    #[error("failed to send {command}: {reason}")]
    CommandSendFailed { command: String, reason: String },

    /// The acknowledgement did not arrive in time.
    #[error("no {expected} within {timeout_ms} ms ({} unexpected messages)", .unexpected.len())]
    AcknowledgementTimeout {
        expected: String,
        timeout_ms: u64,
        unexpected: Vec<String>,
    },

    /// Store, inspector or uploader returned an error.
    #[error("{collaborator} failed: {reason}")]
    CollaboratorFailure {
        collaborator: &'static str,
        reason: String,
    },

    /// A different message arrived while mismatches abort the wait.
    #[error("expected {expected}, controller sent {actual}")]
    ProtocolMismatch { expected: String, actual: String },

    /// The job was not in a state the requested step can start from.
    #[error("cannot move job from {from} to {to}")]
    InvalidTransition { from: JobState, to: JobState },
}

impl JobFailure {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            JobFailure::LinkUnavailable => "link_unavailable",
            JobFailure::CommandSendFailed { .. } => "command_send_failed",
            JobFailure::AcknowledgementTimeout { .. } => "acknowledgement_timeout",
            JobFailure::CollaboratorFailure { .. } => "collaborator_failure",
            JobFailure::ProtocolMismatch { .. } => "protocol_mismatch",
            JobFailure::InvalidTransition { .. } => "invalid_transition",
        }
    }

    pub fn collaborator(collaborator: &'static str, error: impl std::fmt::Display) -> Self {
        JobFailure::CollaboratorFailure {
            collaborator,
            reason: error.to_string(),
        }
    }

    /// Store errors; a rejected transition keeps its own kind.
    pub fn from_store(error: JobError, to: JobState) -> Self {
        match error {
            JobError::InvalidState { current_state, .. } => JobFailure::InvalidTransition {
                from: current_state,
                to,
            },
            other => Self::collaborator("store", other),
        }
    }

    /// Convert a non-matching round trip into a failure. `None` if it matched.
    pub fn from_outcome(outcome: ExpectOutcome, command: &Command) -> Option<Self> {
        match outcome {
            ExpectOutcome::Matched => None,
            ExpectOutcome::SendFailed(LinkError::NotConnected) => Some(JobFailure::LinkUnavailable),
            ExpectOutcome::SendFailed(LinkError::Write(e)) => Some(JobFailure::CommandSendFailed {
                command: command.text.clone(),
                reason: e.to_string(),
            }),
            ExpectOutcome::TimedOut { unexpected } => Some(JobFailure::AcknowledgementTimeout {
                expected: command.expected_ack.to_string(),
                timeout_ms: command.timeout.as_millis() as u64,
                unexpected,
            }),
            ExpectOutcome::Mismatched { actual } => Some(JobFailure::ProtocolMismatch {
                expected: command.expected_ack.to_string(),
                actual,
            }),
        }
    }
}

/// Result of driving one job to a terminal state.
#[derive(Debug)]
pub struct JobOutcome {
    pub job_id: String,
    /// `Completed` or `Failed`.
    pub final_state: JobState,
    pub failure: Option<JobFailure>,
    /// The state the job was in when it failed.
    pub failed_in: Option<JobState>,
    pub report: Option<QualityReport>,
    pub artifact_url: Option<String>,
}

impl JobOutcome {
    pub fn is_completed(&self) -> bool {
        self.final_state == JobState::Completed
    }
}

/// The job the poll loop is working on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentJob {
    pub id: String,
    pub title: String,
    pub started_at: DateTime<Utc>,
}

/// Current status of the poll loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollStatus {
    /// Whether the poll loop is running.
    pub running: bool,
    /// Jobs driven to a terminal state since start.
    pub jobs_processed: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    /// Job in flight, if any.
    pub current_job: Option<CurrentJob>,
    /// When the store was last polled for queued jobs.
    pub last_poll_at: Option<DateTime<Utc>>,
}
