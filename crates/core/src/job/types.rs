//! Core job data types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::QualityThresholds;

/// Job lifecycle state.
///
/// State machine:
/// ```text
/// Queued -> Printing -> AwaitingPickup -> Capturing -> Analyzing -> AwaitingPlacement -> Completed
///
/// Any non-terminal state can transition to Failed.
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Created externally, waiting to be picked up by the poll loop.
    Queued,
    /// The printer is producing the object.
    Printing,
    /// Print finished, robot asked to move it under the camera.
    AwaitingPickup,
    /// Capturing the inspection artifact.
    Capturing,
    /// Scoring the captured artifact.
    Analyzing,
    /// Robot asked to drop the object in the good or bad bin.
    AwaitingPlacement,
    /// Sorted successfully (terminal).
    Completed,
    /// Some step failed (terminal).
    Failed,
}

impl JobState {
    /// Every state in lifecycle order.
    pub const ALL: [JobState; 8] = [
        JobState::Queued,
        JobState::Printing,
        JobState::AwaitingPickup,
        JobState::Capturing,
        JobState::Analyzing,
        JobState::AwaitingPlacement,
        JobState::Completed,
        JobState::Failed,
    ];

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Returns true while the orchestrator is actively working on the job.
    pub fn is_processing(&self) -> bool {
        !self.is_terminal() && *self != JobState::Queued
    }

    /// The state that follows this one on the success path.
    pub fn next(&self) -> Option<JobState> {
        match self {
            JobState::Queued => Some(JobState::Printing),
            JobState::Printing => Some(JobState::AwaitingPickup),
            JobState::AwaitingPickup => Some(JobState::Capturing),
            JobState::Capturing => Some(JobState::Analyzing),
            JobState::Analyzing => Some(JobState::AwaitingPlacement),
            JobState::AwaitingPlacement => Some(JobState::Completed),
            JobState::Completed | JobState::Failed => None,
        }
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// Only the single success-path step or a jump to `Failed` is allowed,
    /// so a job can never revisit a state it already left.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == JobState::Failed || self.next() == Some(next)
    }

    /// Returns the state as a string (for filtering and storage).
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Printing => "printing",
            JobState::AwaitingPickup => "awaiting_pickup",
            JobState::Capturing => "capturing",
            JobState::Analyzing => "analyzing",
            JobState::AwaitingPlacement => "awaiting_placement",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobState::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("unknown job state: {}", s))
    }
}

/// Outcome of quality analysis; drives bin routing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Good,
    Bad,
    Uncertain,
}

impl Verdict {
    /// Derive a verdict from a score using the configured thresholds.
    pub fn from_score(score: f64, thresholds: &QualityThresholds) -> Self {
        if score >= thresholds.good_min {
            Verdict::Good
        } else if score < thresholds.bad_below {
            Verdict::Bad
        } else {
            Verdict::Uncertain
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Good => "good",
            Verdict::Bad => "bad",
            Verdict::Uncertain => "uncertain",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "good" => Ok(Verdict::Good),
            "bad" => Ok(Verdict::Bad),
            "uncertain" => Ok(Verdict::Uncertain),
            other => Err(format!("unknown verdict: {}", other)),
        }
    }
}

/// One physical object moving through print, inspect and sort.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    /// Unique identifier, stable for the job's lifetime.
    pub id: String,

    /// Display title.
    pub title: String,

    /// Current lifecycle state.
    pub state: JobState,

    /// Quality score in [0, 100], once analyzed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,

    /// Quality verdict, once analyzed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,

    /// Retrievable URL of the inspection artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_url: Option<String>,

    /// Reason the job failed, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// When printing started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal state. Set exactly once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    /// When the job record was created.
    pub created_at: DateTime<Utc>,

    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_path_is_linear() {
        let mut state = JobState::Queued;
        let mut visited = vec![state];
        while let Some(next) = state.next() {
            assert!(state.can_transition_to(next));
            state = next;
            visited.push(state);
        }
        assert_eq!(state, JobState::Completed);
        assert_eq!(visited.len(), 7);
    }

    #[test]
    fn test_failed_reachable_from_every_non_terminal_state() {
        for state in JobState::ALL {
            if state.is_terminal() {
                assert!(!state.can_transition_to(JobState::Failed));
            } else {
                assert!(state.can_transition_to(JobState::Failed), "{}", state);
            }
        }
    }

    #[test]
    fn test_terminal_states_have_no_outgoing_transitions() {
        for from in [JobState::Completed, JobState::Failed] {
            for to in JobState::ALL {
                assert!(!from.can_transition_to(to));
            }
        }
    }

    #[test]
    fn test_no_backwards_or_skipping_transitions() {
        assert!(!JobState::Capturing.can_transition_to(JobState::AwaitingPickup));
        assert!(!JobState::Analyzing.can_transition_to(JobState::Printing));
        assert!(!JobState::Printing.can_transition_to(JobState::Capturing));
        assert!(!JobState::Queued.can_transition_to(JobState::Completed));
    }

    #[test]
    fn test_state_string_roundtrip() {
        for state in JobState::ALL {
            assert_eq!(state.as_str().parse::<JobState>().unwrap(), state);
        }
        assert!("printed".parse::<JobState>().is_err());
    }

    #[test]
    fn test_processing_flag() {
        assert!(!JobState::Queued.is_processing());
        assert!(JobState::Printing.is_processing());
        assert!(JobState::AwaitingPlacement.is_processing());
        assert!(!JobState::Completed.is_processing());
        assert!(!JobState::Failed.is_processing());
    }

    #[test]
    fn test_verdict_from_score_uses_thresholds() {
        let thresholds = QualityThresholds::default();
        assert_eq!(Verdict::from_score(95.0, &thresholds), Verdict::Good);
        assert_eq!(Verdict::from_score(90.0, &thresholds), Verdict::Good);
        assert_eq!(Verdict::from_score(89.9, &thresholds), Verdict::Uncertain);
        assert_eq!(Verdict::from_score(70.0, &thresholds), Verdict::Uncertain);
        assert_eq!(Verdict::from_score(69.9, &thresholds), Verdict::Bad);
    }

    #[test]
    fn test_verdict_parse_is_case_insensitive() {
        assert_eq!("GOOD".parse::<Verdict>().unwrap(), Verdict::Good);
        assert_eq!("Uncertain".parse::<Verdict>().unwrap(), Verdict::Uncertain);
        assert!("meh".parse::<Verdict>().is_err());
    }

    #[test]
    fn test_job_serialization_skips_empty_fields() {
        let now = Utc::now();
        let job = Job {
            id: "job-1".to_string(),
            title: "Part A".to_string(),
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
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["state"], "queued");
        assert!(json.get("quality_score").is_none());
        assert!(json.get("ended_at").is_none());
    }
}
