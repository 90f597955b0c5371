use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use uuid::Uuid;
use crate::config::PipelineConfig;
use crate::media::FileId;

/// Job types understood by the external processing service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    CompressVideo,
    MergeAudio,
    TrimVideo,
    GenerateSubtitles,
    AddSubtitles,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::CompressVideo => "compress-video",
            JobKind::MergeAudio => "merge-audio",
            JobKind::TrimVideo => "trim-video",
            JobKind::GenerateSubtitles => "generate-subtitles",
            JobKind::AddSubtitles => "add-subtitles",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Receipt for a job the processing service accepted
///
/// Acceptance only means the job was scheduled, not that it finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTicket {
    pub id: Uuid,
    pub kind: JobKind,
    pub file_ids: Vec<FileId>,
    pub accepted_at: DateTime<Utc>,
}

impl JobTicket {
    pub fn new(kind: JobKind, file_ids: Vec<FileId>) -> Self {
        JobTicket {
            id: Uuid::new_v4(),
            kind,
            file_ids,
            accepted_at: Utc::now(),
        }
    }
}

/// External asynchronous processing backend
#[async_trait]
pub trait ProcessingService: Send + Sync {
    /// Ask the backend to schedule one job; returns once the job is accepted
    async fn schedule_job(&self, kind: JobKind, file_ids: &[FileId]) -> Result<JobTicket>;
}

/// Schedules jobs by running a scheduler executable
///
/// Invoked as `<bin> <args..> <job-kind> <file-id>...`. Exit status 0 means
/// accepted. If the first non-empty stdout line is a uuid it becomes the
/// ticket id.
#[derive(Debug, Clone)]
pub struct CommandService {
    pub bin: PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl CommandService {
    pub fn new(bin: PathBuf, args: Vec<String>, timeout: Duration) -> Self {
        CommandService { bin, args, timeout }
    }

    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self::new(
            cfg.scheduler_bin.clone(),
            cfg.scheduler_args.clone(),
            Duration::from_secs(cfg.dispatch_timeout_secs),
        )
    }

    fn build_command(&self, kind: JobKind, file_ids: &[FileId]) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.args(&self.args)
            .arg(kind.as_str())
            .args(file_ids.iter().map(|id| id.to_string()))
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl ProcessingService for CommandService {
    async fn schedule_job(&self, kind: JobKind, file_ids: &[FileId]) -> Result<JobTicket> {
        let mut cmd = self.build_command(kind, file_ids);
        debug!("scheduling {} for {:?} via {}", kind, file_ids, self.bin.display());

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .with_context(|| format!("Scheduler timed out after {}s", self.timeout.as_secs()))?
            .with_context(|| format!("Failed to execute scheduler: {}", self.bin.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            anyhow::bail!(
                "scheduler exited with code {}: {}",
                exit_code,
                stderr.trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut ticket = JobTicket::new(kind, file_ids.to_vec());
        if let Some(id) = stdout
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .and_then(|l| Uuid::parse_str(l).ok())
        {
            ticket.id = id;
        }

        Ok(ticket)
    }
}
