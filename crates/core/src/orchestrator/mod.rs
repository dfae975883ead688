//! Job orchestration.
//!
//! - **JobOrchestrator**: the per-job state machine (print, pickup, capture,
//!   analyze, place)
//! - **PollLoop**: sequential scheduler feeding queued jobs to it, one at a
//!   time, only while a robot controller is connected

mod config;
mod poll;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use poll::{PollLoop, PollTick};
pub use runner::{JobOrchestrator, StepTimings};
pub use types::{CurrentJob, JobFailure, JobOutcome, PollStatus};
