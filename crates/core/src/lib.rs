pub mod config;
pub mod device;
pub mod inspection;
pub mod job;
pub mod metrics;
pub mod orchestrator;
pub mod testing;
pub mod upload;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use device::{Correlator, DeviceLink, DeviceListener, ExpectOutcome, LinkError, MismatchPolicy};
pub use inspection::{CommandInspector, InspectionError, Inspector, QualityReport};
pub use job::{
    CreateJobRequest, Job, JobError, JobFilter, JobState, JobStore, RestJobStore, SqliteJobStore,
    StatusUpdate, Verdict,
};
pub use orchestrator::{
    JobFailure, JobOrchestrator, JobOutcome, OrchestratorConfig, PollLoop, PollStatus, StepTimings,
};
pub use upload::{FsUploader, StorageUploader, UploadError, Uploader};
