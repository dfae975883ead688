//! The scheduling loop in front of the job orchestrator.
//!
//! One job at a time: check the controller, fetch queued jobs, drive each to
//! a terminal state, pause, repeat.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::device::DeviceLink;
use crate::job::JobStore;

use super::config::OrchestratorConfig;
use super::runner::JobOrchestrator;
use super::types::{CurrentJob, PollStatus};

/// What one poll iteration found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTick {
    /// No controller connected; the store was not queried.
    LinkDown,
    /// Nothing queued.
    Idle,
    /// This many jobs were driven to a terminal state.
    Processed(usize),
    /// Shutdown was requested mid-batch.
    Stopped,
}

struct PollShared {
    config: OrchestratorConfig,
    store: Arc<dyn JobStore>,
    link: Arc<DeviceLink>,
    orchestrator: Arc<JobOrchestrator>,
    running: AtomicBool,
    status: RwLock<PollStatus>,
}

pub struct PollLoop {
    shared: Arc<PollShared>,
    shutdown_tx: broadcast::Sender<()>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PollLoop {
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn JobStore>,
        link: Arc<DeviceLink>,
        orchestrator: Arc<JobOrchestrator>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            shared: Arc::new(PollShared {
                config,
                store,
                link,
                orchestrator,
                running: AtomicBool::new(false),
                status: RwLock::new(PollStatus::default()),
            }),
            shutdown_tx,
            task: Mutex::new(None),
        }
    }

    /// Start the loop in a background task.
    pub async fn start(&self) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            warn!("Poll loop already running");
            return;
        }

        info!("Starting poll loop");
        let shared = Arc::clone(&self.shared);
        let shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move { shared.run(shutdown_rx).await });
        *self.task.lock().await = Some(handle);
    }

    /// Stop the loop. A job in flight is finished first.
    pub async fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            warn!("Poll loop not running");
            return;
        }

        info!("Stopping poll loop");
        let _ = self.shutdown_tx.send(());

        if let Some(handle) = self.task.lock().await.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Poll loop task ended abnormally");
            }
        }
        info!("Poll loop stopped");
    }

    pub async fn status(&self) -> PollStatus {
        let mut status = self.shared.status.read().await.clone();
        status.running = self.shared.running.load(Ordering::Relaxed);
        status
    }

    /// Run a single iteration, including the pause after each job.
    pub async fn run_once(&self) -> PollTick {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        self.shared.poll_once(&mut shutdown_rx).await
    }
}

impl PollShared {
    async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Poll loop started");
        loop {
            let backoff = match self.poll_once(&mut shutdown_rx).await {
                PollTick::LinkDown => self.config.link_retry_interval_ms,
                PollTick::Idle => self.config.idle_poll_interval_ms,
                PollTick::Processed(_) => 0,
                PollTick::Stopped => break,
            };
            if !self.pause(Duration::from_millis(backoff), &mut shutdown_rx).await {
                break;
            }
        }
        info!("Poll loop exited");
    }

    async fn poll_once(&self, shutdown_rx: &mut broadcast::Receiver<()>) -> PollTick {
        if !self.link.is_live() {
            info!(
                retry_ms = self.config.link_retry_interval_ms,
                "Robot controller not connected, waiting"
            );
            return PollTick::LinkDown;
        }

        self.status.write().await.last_poll_at = Some(Utc::now());
        let jobs = match self.store.list_queued().await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(store = self.store.name(), error = %e, "Failed to list queued jobs");
                Vec::new()
            }
        };

        if jobs.is_empty() {
            debug!(
                retry_ms = self.config.idle_poll_interval_ms,
                "No queued jobs"
            );
            return PollTick::Idle;
        }

        info!(count = jobs.len(), "Found queued jobs");
        let mut processed = 0;
        for job in jobs {
            // Leave the rest queued rather than failing them one by one.
            if !self.link.is_live() {
                warn!(remaining_from = %job.id, "Robot controller disconnected, pausing batch");
                return if processed == 0 {
                    PollTick::LinkDown
                } else {
                    PollTick::Processed(processed)
                };
            }

            self.status.write().await.current_job = Some(CurrentJob {
                id: job.id.clone(),
                title: job.title.clone(),
                started_at: Utc::now(),
            });

            let outcome = self.orchestrator.process(&job).await;
            processed += 1;

            {
                let mut status = self.status.write().await;
                status.current_job = None;
                status.jobs_processed += 1;
                if outcome.is_completed() {
                    status.jobs_completed += 1;
                } else {
                    status.jobs_failed += 1;
                }
            }

            let delay = Duration::from_millis(self.config.inter_job_delay_ms);
            if !self.pause(delay, shutdown_rx).await {
                return PollTick::Stopped;
            }
        }

        PollTick::Processed(processed)
    }

    /// Sleep for `duration`. Returns `false` if shutdown was signalled.
    async fn pause(&self, duration: Duration, shutdown_rx: &mut broadcast::Receiver<()>) -> bool {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Poll loop received shutdown signal");
                false
            }
            _ = tokio::time::sleep(duration) => true,
        }
    }
}
