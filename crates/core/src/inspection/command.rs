//! Inspector backed by external capture and analysis programs.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, info};

use super::error::InspectionError;
use super::traits::Inspector;
use super::types::QualityReport;
use crate::config::{InspectorConfig, QualityThresholds};
use crate::job::Job;

/// Runs the configured capture and analyze commands.
///
/// Arguments may contain `{job_id}` and `{output_dir}` (capture) or `{path}`
/// (analyze). Capture prints the artifact path as the last line of stdout;
/// analyze prints a report understood by [`QualityReport::parse`].
pub struct CommandInspector {
    config: InspectorConfig,
    thresholds: QualityThresholds,
}

impl CommandInspector {
    pub fn new(config: InspectorConfig, thresholds: QualityThresholds) -> Self {
        Self { config, thresholds }
    }

    fn substitute(template: &[String], vars: &[(&str, &str)]) -> Vec<String> {
        template
            .iter()
            .map(|arg| {
                vars.iter()
                    .fold(arg.clone(), |acc, (key, value)| acc.replace(key, value))
            })
            .collect()
    }

    /// Run a command to completion and return its stdout.
    async fn run(&self, args: Vec<String>) -> Result<String, InspectionError> {
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| InspectionError::command_failed("empty command", None))?;

        debug!(program = %program, args = ?rest, "Running inspection command");

        let child = Command::new(program)
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    InspectionError::ProgramNotFound {
                        program: program.clone(),
                    }
                } else {
                    InspectionError::Io(e)
                }
            })?;

        // Dropping the output future on timeout kills the child.
        let output = timeout(
            Duration::from_secs(self.config.timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| InspectionError::Timeout {
            timeout_secs: self.config.timeout_secs,
        })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(InspectionError::command_failed(
                format!("{} exited with code: {:?}", program, output.status.code()),
                if stderr.is_empty() { None } else { Some(stderr) },
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl Inspector for CommandInspector {
    fn name(&self) -> &str {
        "command"
    }

    async fn capture(&self, job: &Job) -> Result<PathBuf, InspectionError> {
        tokio::fs::create_dir_all(&self.config.output_dir).await?;

        let output_dir = self.config.output_dir.to_string_lossy();
        let args = Self::substitute(
            &self.config.capture_command,
            &[("{job_id}", job.id.as_str()), ("{output_dir}", &*output_dir)],
        );
        let stdout = self.run(args).await?;

        let line = stdout
            .lines()
            .map(str::trim)
            .rfind(|l| !l.is_empty())
            .ok_or_else(|| InspectionError::command_failed("capture printed no path", None))?;
        let path = PathBuf::from(line);

        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(InspectionError::ArtifactMissing { path });
        }

        info!(job_id = %job.id, path = %path.display(), "Captured print");
        Ok(path)
    }

    async fn analyze(&self, artifact: &Path) -> Result<QualityReport, InspectionError> {
        let path = artifact.to_string_lossy();
        let args = Self::substitute(&self.config.analyze_command, &[("{path}", &*path)]);
        let stdout = self.run(args).await?;

        let report = QualityReport::parse(&stdout, &self.thresholds)?;
        info!(
            path = %artifact.display(),
            score = report.score,
            verdict = %report.verdict,
            "Analyzed print"
        );
        Ok(report)
    }
}
