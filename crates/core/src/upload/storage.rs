//! Object storage uploader (Supabase-style storage REST API).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use tracing::{debug, info};

use super::traits::{object_name, UploadError, Uploader};
use crate::config::StorageUploadConfig;

pub struct StorageUploader {
    client: Client,
    config: StorageUploadConfig,
}

impl StorageUploader {
    pub fn new(config: StorageUploadConfig) -> Result<Self, UploadError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| UploadError::Storage(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    /// Upload endpoint for `name`.
    pub fn object_url(&self, name: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url(),
            self.config.bucket,
            urlencoding::encode(name)
        )
    }

    /// Public retrieval URL for `name`.
    pub fn public_url(&self, name: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url(),
            self.config.bucket,
            urlencoding::encode(name)
        )
    }
}

fn content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl Uploader for StorageUploader {
    fn name(&self) -> &str {
        "storage"
    }

    async fn upload(&self, artifact: &Path) -> Result<String, UploadError> {
        let name = object_name(artifact, Utc::now().timestamp())?;
        let bytes = tokio::fs::read(artifact).await.map_err(|source| UploadError::Read {
            path: artifact.to_path_buf(),
            source,
        })?;

        debug!(name = %name, size = bytes.len(), "Uploading artifact");

        let response = self
            .client
            .post(self.object_url(&name))
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
            .header(reqwest::header::CONTENT_TYPE, content_type(artifact))
            .body(bytes)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UploadError::Storage("request timed out".to_string())
                } else {
                    UploadError::Storage(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Storage(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let url = self.public_url(&name);
        info!(url = %url, "Artifact uploaded");
        Ok(url)
    }
}
