//! Trait definitions for the inspection module.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::error::InspectionError;
use super::types::QualityReport;
use crate::job::Job;

/// Captures and scores a finished print in the inspection position.
#[async_trait]
pub trait Inspector: Send + Sync {
    /// Returns the name of this inspector implementation.
    fn name(&self) -> &str;

    /// Capture the object for `job`, returning the local artifact path.
    async fn capture(&self, job: &Job) -> Result<PathBuf, InspectionError>;

    /// Score a captured artifact.
    async fn analyze(&self, artifact: &Path) -> Result<QualityReport, InspectionError>;
}
