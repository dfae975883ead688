//! Job state machine.
//!
//! Drives one job from `Queued` to `Completed`, collapsing to `Failed` on
//! the first failing step. Every transition is persisted before the step
//! that follows it runs.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{error, info, warn};

use crate::config::DeviceConfig;
use crate::device::{Bin, Command, Correlator};
use crate::inspection::{Inspector, QualityReport};
use crate::job::{Job, JobState, JobStore, StatusUpdate};
use crate::metrics;
use crate::upload::Uploader;

use super::config::OrchestratorConfig;
use super::types::{JobFailure, JobOutcome};

/// How long each timed step may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTimings {
    /// Simulated print time before pickup.
    pub print_duration: Duration,
    pub pickup_timeout: Duration,
    pub placement_timeout: Duration,
}

impl StepTimings {
    pub fn from_config(orchestrator: &OrchestratorConfig, device: &DeviceConfig) -> Self {
        Self {
            print_duration: Duration::from_millis(orchestrator.print_duration_ms),
            pickup_timeout: Duration::from_millis(device.pickup_timeout_ms),
            placement_timeout: Duration::from_millis(device.placement_timeout_ms),
        }
    }
}

/// Progress of the job being driven.
struct Run {
    state: JobState,
    artifact_url: Option<String>,
    report: Option<QualityReport>,
}

/// Drives jobs through print, pickup, inspection and placement.
pub struct JobOrchestrator {
    store: Arc<dyn JobStore>,
    correlator: Arc<Correlator>,
    inspector: Arc<dyn Inspector>,
    uploader: Arc<dyn Uploader>,
    timings: StepTimings,
}

impl JobOrchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        correlator: Arc<Correlator>,
        inspector: Arc<dyn Inspector>,
        uploader: Arc<dyn Uploader>,
        timings: StepTimings,
    ) -> Self {
        Self {
            store,
            correlator,
            inspector,
            uploader,
            timings,
        }
    }

    /// Drive `job` to a terminal state.
    ///
    /// Never returns an error: any failure becomes a `Failed` outcome,
    /// persisted on a best-effort basis.
    pub async fn process(&self, job: &Job) -> JobOutcome {
        let started = Instant::now();
        let mut run = Run {
            state: job.state,
            artifact_url: None,
            report: None,
        };

        info!(job_id = %job.id, title = %job.title, "Processing job");

        let result = match self.drive(job, &mut run).await {
            Ok(()) => self.finish(job, &mut run).await,
            Err(failure) => Err(failure),
        };

        let outcome = match result {
            Ok(()) => JobOutcome {
                job_id: job.id.clone(),
                final_state: JobState::Completed,
                failure: None,
                failed_in: None,
                report: run.report,
                artifact_url: run.artifact_url,
            },
            Err(failure) => {
                let failed_in = run.state;
                self.fail(job, &mut run, &failure).await;
                metrics::JOB_FAILURES
                    .with_label_values(&[failure.kind()])
                    .inc();
                JobOutcome {
                    job_id: job.id.clone(),
                    final_state: JobState::Failed,
                    failure: Some(failure),
                    failed_in: Some(failed_in),
                    report: run.report,
                    artifact_url: run.artifact_url,
                }
            }
        };

        let label = outcome.final_state.as_str();
        metrics::JOBS_PROCESSED.with_label_values(&[label]).inc();
        metrics::JOB_DURATION
            .with_label_values(&[label])
            .observe(started.elapsed().as_secs_f64());

        outcome
    }

    async fn drive(&self, job: &Job, run: &mut Run) -> Result<(), JobFailure> {
        // Queued: start the print and wait for it to finish.
        self.transition(
            job,
            run,
            StatusUpdate::new(JobState::Printing).with_started_at(Utc::now()),
        )
        .await?;
        tokio::time::sleep(self.timings.print_duration).await;
        self.transition(job, run, StatusUpdate::new(JobState::AwaitingPickup))
            .await?;

        // Move the print to the inspection position.
        self.round_trip(&Command::pickup(&job.id, self.timings.pickup_timeout))
            .await?;
        self.transition(job, run, StatusUpdate::new(JobState::Capturing))
            .await?;

        // Capture and publish.
        let artifact = timed("capture", self.inspector.capture(job))
            .await
            .map_err(|e| JobFailure::collaborator("inspector", e))?;
        let url = timed("upload", self.uploader.upload(&artifact))
            .await
            .map_err(|e| JobFailure::collaborator("uploader", e))?;
        run.artifact_url = Some(url.clone());
        self.transition(job, run, StatusUpdate::new(JobState::Analyzing))
            .await?;

        // Score and record.
        let report = timed("analyze", self.inspector.analyze(&artifact))
            .await
            .map_err(|e| JobFailure::collaborator("inspector", e))?;
        run.report = Some(report);
        self.store
            .update_quality(&job.id, report.score, report.verdict, &url)
            .await
            .map_err(|e| JobFailure::from_store(e, JobState::AwaitingPlacement))?;
        self.transition(job, run, StatusUpdate::new(JobState::AwaitingPlacement))
            .await?;

        // Sort into a bin.
        let bin = Bin::for_verdict(report.verdict);
        info!(
            job_id = %job.id,
            score = report.score,
            verdict = %report.verdict,
            bin = bin.as_str(),
            "Placing inspected print"
        );
        self.round_trip(&Command::place(bin, &job.id, self.timings.placement_timeout))
            .await?;

        Ok(())
    }

    async fn round_trip(&self, command: &Command) -> Result<(), JobFailure> {
        let outcome = self.correlator.expect(command).await;
        match JobFailure::from_outcome(outcome, command) {
            None => Ok(()),
            Some(failure) => Err(failure),
        }
    }

    /// Persist a non-terminal transition. A store failure fails the job.
    async fn transition(
        &self,
        job: &Job,
        run: &mut Run,
        update: StatusUpdate,
    ) -> Result<(), JobFailure> {
        let to = update.state;
        if !run.state.can_transition_to(to) {
            return Err(JobFailure::InvalidTransition {
                from: run.state,
                to,
            });
        }

        self.store
            .update_status(&job.id, update)
            .await
            .map_err(|e| JobFailure::from_store(e, to))?;

        info!(job_id = %job.id, from = %run.state, to = %to, "Job state transition");
        run.state = to;
        Ok(())
    }

    /// Persist completion. If the write fails the job is failed instead,
    /// so the record never stays in a processing state.
    async fn finish(&self, job: &Job, run: &mut Run) -> Result<(), JobFailure> {
        let update = StatusUpdate::new(JobState::Completed).with_ended_at(Utc::now());
        self.store
            .update_status(&job.id, update)
            .await
            .map_err(|e| JobFailure::from_store(e, JobState::Completed))?;

        info!(job_id = %job.id, from = %run.state, to = %JobState::Completed, "Job completed");
        run.state = JobState::Completed;
        Ok(())
    }

    async fn fail(&self, job: &Job, run: &mut Run, failure: &JobFailure) {
        error!(
            job_id = %job.id,
            from = %run.state,
            to = %JobState::Failed,
            kind = failure.kind(),
            error = %failure,
            "Job failed"
        );
        if let JobFailure::AcknowledgementTimeout { unexpected, .. } = failure {
            if !unexpected.is_empty() {
                warn!(job_id = %job.id, messages = ?unexpected, "Controller sent unexpected messages while waiting");
            }
        }

        if run.state.is_terminal() {
            // Nothing to persist: the record is already final.
            return;
        }

        let update = StatusUpdate::new(JobState::Failed)
            .with_ended_at(Utc::now())
            .with_error(failure.to_string());
        if let Err(e) = self.store.update_status(&job.id, update).await {
            error!(job_id = %job.id, error = %e, "Failed to persist job failure");
        }
        run.state = JobState::Failed;
    }
}

/// Await a collaborator call, recording its duration.
async fn timed<T, E, F>(operation: &'static str, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let started = Instant::now();
    let result = fut.await;
    let label = if result.is_ok() { "ok" } else { "error" };
    metrics::COLLABORATOR_DURATION
        .with_label_values(&[operation, label])
        .observe(started.elapsed().as_secs_f64());
    if let Err(e) = &result {
        warn!(operation = operation, error = %e, "Collaborator call failed");
    }
    result
}
