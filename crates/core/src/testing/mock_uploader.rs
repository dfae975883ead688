//! Mock uploader for testing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::upload::{UploadError, Uploader};

/// Records uploads and returns deterministic URLs without reading files.
#[derive(Debug, Default)]
pub struct MockUploader {
    uploaded: Arc<RwLock<Vec<PathBuf>>>,
    next_error: Arc<RwLock<Option<String>>>,
}

impl MockUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn uploaded(&self) -> Vec<PathBuf> {
        self.uploaded.read().await.clone()
    }

    pub async fn set_next_error(&self, message: &str) {
        *self.next_error.write().await = Some(message.to_string());
    }
}

#[async_trait]
impl Uploader for MockUploader {
    fn name(&self) -> &str {
        "mock"
    }

    async fn upload(&self, artifact: &Path) -> Result<String, UploadError> {
        if let Some(message) = self.next_error.write().await.take() {
            return Err(UploadError::Storage(message));
        }
        let name = artifact
            .file_name()
            .ok_or_else(|| UploadError::InvalidPath(artifact.to_path_buf()))?
            .to_string_lossy()
            .to_string();
        self.uploaded.write().await.push(artifact.to_path_buf());
        Ok(format!("https://storage.test/printed-objects/{}", name))
    }
}
