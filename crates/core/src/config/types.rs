use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::device::MismatchPolicy;
use crate::orchestrator::OrchestratorConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub inspector: InspectorConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub quality: QualityThresholds,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

/// HTTP status API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Robot controller link configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// Address the controller connects to.
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_device_port")]
    pub port: u16,
    /// How long to wait for `ROBOT_PICKUP_COMPLETE`.
    #[serde(default = "default_pickup_timeout")]
    pub pickup_timeout_ms: u64,
    /// How long to wait for `ROBOT_PLACE_*_COMPLETE`.
    #[serde(default = "default_placement_timeout")]
    pub placement_timeout_ms: u64,
    /// What to do with a message that is not the awaited acknowledgement.
    #[serde(default)]
    pub mismatch_policy: MismatchPolicy,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_device_port(),
            pickup_timeout_ms: default_pickup_timeout(),
            placement_timeout_ms: default_placement_timeout(),
            mismatch_policy: MismatchPolicy::default(),
        }
    }
}

fn default_device_port() -> u16 {
    65432
}

fn default_pickup_timeout() -> u64 {
    60_000
}

fn default_placement_timeout() -> u64 {
    30_000
}

/// Score thresholds for deriving a verdict
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct QualityThresholds {
    /// Scores at or above this are good.
    #[serde(default = "default_good_min")]
    pub good_min: f64,
    /// Scores below this are bad; anything in between is uncertain.
    #[serde(default = "default_bad_below")]
    pub bad_below: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            good_min: default_good_min(),
            bad_below: default_bad_below(),
        }
    }
}

fn default_good_min() -> f64 {
    90.0
}

fn default_bad_below() -> f64 {
    70.0
}

/// Available job store backends
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Rest,
}

/// Job store configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default)]
    pub sqlite: SqliteStoreConfig,
    /// Required when backend = "rest"
    #[serde(default)]
    pub rest: Option<RestStoreConfig>,
}

/// Embedded SQLite store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SqliteStoreConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for SqliteStoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("printsort.db")
}

/// PostgREST store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RestStoreConfig {
    /// Project URL (e.g., "https://project.supabase.co")
    pub url: String,
    pub api_key: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_table() -> String {
    "prints".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// External capture/analysis commands
///
/// Placeholders: `{job_id}` and `{output_dir}` in the capture command,
/// `{path}` in the analyze command.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InspectorConfig {
    /// Program and arguments; prints the artifact path on stdout.
    pub capture_command: Vec<String>,
    /// Program and arguments; prints a score or `{"score": .., "verdict": ..}`.
    pub analyze_command: Vec<String>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_command_timeout")]
    pub timeout_secs: u64,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("captures")
}

fn default_command_timeout() -> u64 {
    120
}

/// Available artifact upload backends
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UploadBackend {
    #[default]
    Fs,
    Storage,
}

/// Artifact upload configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UploadConfig {
    #[serde(default)]
    pub backend: UploadBackend,
    #[serde(default)]
    pub fs: FsUploadConfig,
    /// Required when backend = "storage"
    #[serde(default)]
    pub storage: Option<StorageUploadConfig>,
}

/// Local directory upload configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FsUploadConfig {
    #[serde(default = "default_artifact_dir")]
    pub dir: PathBuf,
}

impl Default for FsUploadConfig {
    fn default() -> Self {
        Self {
            dir: default_artifact_dir(),
        }
    }
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

/// Object storage upload configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageUploadConfig {
    pub url: String,
    pub api_key: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default = "default_upload_timeout")]
    pub timeout_secs: u64,
}

fn default_bucket() -> String {
    "printed-objects".to_string()
}

fn default_upload_timeout() -> u64 {
    60
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub device: DeviceConfig,
    pub orchestrator: OrchestratorConfig,
    pub quality: QualityThresholds,
    pub store: SanitizedStoreConfig,
    pub upload: SanitizedUploadConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedStoreConfig {
    pub backend: StoreBackend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sqlite_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rest_url: Option<String>,
    pub api_key_configured: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedUploadConfig {
    pub backend: UploadBackend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    pub api_key_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        let store = match config.store.backend {
            StoreBackend::Sqlite => SanitizedStoreConfig {
                backend: StoreBackend::Sqlite,
                sqlite_path: Some(config.store.sqlite.path.clone()),
                rest_url: None,
                api_key_configured: false,
            },
            StoreBackend::Rest => SanitizedStoreConfig {
                backend: StoreBackend::Rest,
                sqlite_path: None,
                rest_url: config.store.rest.as_ref().map(|r| r.url.clone()),
                api_key_configured: config
                    .store
                    .rest
                    .as_ref()
                    .is_some_and(|r| !r.api_key.is_empty()),
            },
        };

        let upload = match config.upload.backend {
            UploadBackend::Fs => SanitizedUploadConfig {
                backend: UploadBackend::Fs,
                dir: Some(config.upload.fs.dir.clone()),
                storage_url: None,
                bucket: None,
                api_key_configured: false,
            },
            UploadBackend::Storage => {
                let storage = config.upload.storage.as_ref();
                SanitizedUploadConfig {
                    backend: UploadBackend::Storage,
                    dir: None,
                    storage_url: storage.map(|s| s.url.clone()),
                    bucket: storage.map(|s| s.bucket.clone()),
                    api_key_configured: storage.is_some_and(|s| !s.api_key.is_empty()),
                }
            }
        };

        Self {
            server: config.server.clone(),
            device: config.device.clone(),
            orchestrator: config.orchestrator.clone(),
            quality: config.quality.clone(),
            store,
            upload,
        }
    }
}
