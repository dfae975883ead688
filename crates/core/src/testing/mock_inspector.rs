//! Mock inspector for testing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::inspection::{InspectionError, Inspector, QualityReport};
use crate::job::{Job, Verdict};

/// Mock implementation of the Inspector trait.
///
/// Captures never touch a camera: the returned path is synthetic and only
/// meaningful to the paired mock uploader. Analysis returns the configured
/// report (95.0 / good by default).
#[derive(Debug)]
pub struct MockInspector {
    report: Arc<RwLock<QualityReport>>,
    /// Job ids captured, in order.
    captured: Arc<RwLock<Vec<String>>>,
    /// Artifacts analyzed, in order.
    analyzed: Arc<RwLock<Vec<PathBuf>>>,
    capture_error: Arc<RwLock<Option<String>>>,
    analyze_error: Arc<RwLock<Option<String>>>,
    /// Simulated analysis time.
    analyze_delay: Arc<RwLock<Duration>>,
}

impl Default for MockInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockInspector {
    pub fn new() -> Self {
        Self {
            report: Arc::new(RwLock::new(QualityReport {
                score: 95.0,
                verdict: Verdict::Good,
            })),
            captured: Arc::new(RwLock::new(Vec::new())),
            analyzed: Arc::new(RwLock::new(Vec::new())),
            capture_error: Arc::new(RwLock::new(None)),
            analyze_error: Arc::new(RwLock::new(None)),
            analyze_delay: Arc::new(RwLock::new(Duration::ZERO)),
        }
    }

    /// Report returned by every subsequent `analyze`.
    pub async fn set_report(&self, report: QualityReport) {
        *self.report.write().await = report;
    }

    pub async fn fail_next_capture(&self, message: &str) {
        *self.capture_error.write().await = Some(message.to_string());
    }

    pub async fn fail_next_analyze(&self, message: &str) {
        *self.analyze_error.write().await = Some(message.to_string());
    }

    pub async fn set_analyze_delay(&self, delay: Duration) {
        *self.analyze_delay.write().await = delay;
    }

    pub async fn captured(&self) -> Vec<String> {
        self.captured.read().await.clone()
    }

    pub async fn analyzed(&self) -> Vec<PathBuf> {
        self.analyzed.read().await.clone()
    }
}

#[async_trait]
impl Inspector for MockInspector {
    fn name(&self) -> &str {
        "mock"
    }

    async fn capture(&self, job: &Job) -> Result<PathBuf, InspectionError> {
        if let Some(message) = self.capture_error.write().await.take() {
            return Err(InspectionError::command_failed(message, None));
        }
        self.captured.write().await.push(job.id.clone());
        Ok(PathBuf::from(format!("/captures/object_{}.jpg", job.id)))
    }

    async fn analyze(&self, artifact: &Path) -> Result<QualityReport, InspectionError> {
        let delay = *self.analyze_delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = self.analyze_error.write().await.take() {
            return Err(InspectionError::command_failed(message, None));
        }
        self.analyzed.write().await.push(artifact.to_path_buf());
        Ok(*self.report.read().await)
    }
}
