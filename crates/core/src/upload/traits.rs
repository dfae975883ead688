use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from publishing an artifact.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The local artifact is missing or unreadable.
    #[error("cannot read artifact {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The artifact path has no file name to publish under.
    #[error("artifact path has no file name: {0}")]
    InvalidPath(PathBuf),

    /// Transport failure or non-success response from the storage service.
    #[error("storage error: {0}")]
    Storage(String),

    /// Local copy failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Publishes a local inspection artifact and returns a retrievable URL.
#[async_trait]
pub trait Uploader: Send + Sync {
    fn name(&self) -> &str;

    async fn upload(&self, artifact: &Path) -> Result<String, UploadError>;
}

/// Name an artifact is published under: `<unix_secs>_<file name>`.
pub fn object_name(artifact: &Path, unix_secs: i64) -> Result<String, UploadError> {
    let file_name = artifact
        .file_name()
        .ok_or_else(|| UploadError::InvalidPath(artifact.to_path_buf()))?;
    Ok(format!("{}_{}", unix_secs, file_name.to_string_lossy()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_name() {
        assert_eq!(
            object_name(Path::new("/captures/object_7.jpg"), 1_700_000_000).unwrap(),
            "1700000000_object_7.jpg"
        );
        assert!(matches!(
            object_name(Path::new("/"), 1),
            Err(UploadError::InvalidPath(_))
        ));
    }
}
