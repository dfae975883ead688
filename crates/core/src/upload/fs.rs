//! Local directory "uploader" for bench setups without object storage.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use super::traits::{object_name, UploadError, Uploader};

/// Copies artifacts into a directory and returns `file://` URLs.
pub struct FsUploader {
    dir: PathBuf,
}

impl FsUploader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Uploader for FsUploader {
    fn name(&self) -> &str {
        "fs"
    }

    async fn upload(&self, artifact: &Path) -> Result<String, UploadError> {
        let name = object_name(artifact, Utc::now().timestamp())?;

        if !tokio::fs::try_exists(artifact).await.unwrap_or(false) {
            return Err(UploadError::Read {
                path: artifact.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            });
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let dest = self.dir.join(&name);
        tokio::fs::copy(artifact, &dest).await?;

        let dest = tokio::fs::canonicalize(&dest).await.unwrap_or(dest);
        let url = format!("file://{}", dest.display());
        info!(url = %url, "Artifact stored");
        Ok(url)
    }
}
