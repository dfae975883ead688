//! Error types for the inspection module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while capturing or analyzing a print.
#[derive(Debug, Error)]
pub enum InspectionError {
    /// The configured program could not be found.
    #[error("Inspection program not found: {program}")]
    ProgramNotFound { program: String },

    /// The program ran but exited unsuccessfully.
    #[error("Inspection command failed: {reason}")]
    CommandFailed {
        reason: String,
        stderr: Option<String>,
    },

    /// The program did not finish in time.
    #[error("Inspection command timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Capture reported an artifact that does not exist.
    #[error("Captured artifact not found: {path}")]
    ArtifactMissing { path: PathBuf },

    /// Analysis output could not be understood.
    #[error("Invalid analysis output: {reason}")]
    InvalidReport { reason: String },

    /// Analysis produced a score outside [0, 100].
    #[error("Quality score {score} is outside [0, 100]")]
    ScoreOutOfRange { score: f64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl InspectionError {
    pub fn command_failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::CommandFailed {
            reason: reason.into(),
            stderr,
        }
    }

    pub fn invalid_report(reason: impl Into<String>) -> Self {
        Self::InvalidReport {
            reason: reason.into(),
        }
    }
}
