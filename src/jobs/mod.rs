//! Transcription jobs: records, status machine, persistence and the lifecycle manager.

mod manager;
mod memory;
mod sqlite;

pub use manager::{JobManager, JobResult, Submission};
pub use memory::MemoryJobStore;
pub use sqlite::SqliteJobStore;

use crate::error::{PodscribeError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Default number of jobs shown in listings.
pub const DEFAULT_LIST_LIMIT: usize = 20;

/// Job status. Jobs only move forward: NEW -> RUNNING -> DONE | FAILED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    New,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::New => "NEW",
            JobStatus::Running => "RUNNING",
            JobStatus::Done => "DONE",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::New, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Done)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = PodscribeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "NEW" => Ok(JobStatus::New),
            "RUNNING" => Ok(JobStatus::Running),
            "DONE" => Ok(JobStatus::Done),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(PodscribeError::Store(format!("Unknown job status: {}", other))),
        }
    }
}

/// A transcription job.
///
/// `output_location` is set exactly when the job is DONE. `elapsed_seconds` and
/// `return_code` stay unset until the job is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_id: String,
    pub podcast: String,
    pub episode: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub elapsed_seconds: Option<i64>,
    pub return_code: Option<i32>,
    pub output_location: Option<String>,
}

impl Job {
    /// Create a NEW job with a fresh id.
    pub fn new(podcast: impl Into<String>, episode: impl Into<String>) -> Self {
        Self {
            job_id: Uuid::new_v4().simple().to_string(),
            podcast: podcast.into(),
            episode: episode.into(),
            status: JobStatus::New,
            created_at: Utc::now(),
            elapsed_seconds: None,
            return_code: None,
            output_location: None,
        }
    }

    fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(PodscribeError::InvalidTransition {
                job_id: self.job_id.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn mark_running(&mut self) -> Result<()> {
        self.transition(JobStatus::Running)
    }

    pub fn mark_done(&mut self, elapsed_seconds: i64, output_location: impl Into<String>) -> Result<()> {
        self.transition(JobStatus::Done)?;
        self.elapsed_seconds = Some(elapsed_seconds);
        self.return_code = Some(0);
        self.output_location = Some(output_location.into());
        Ok(())
    }

    pub fn mark_failed(&mut self, return_code: i32) -> Result<()> {
        self.transition(JobStatus::Failed)?;
        self.return_code = Some(if return_code == 0 { 1 } else { return_code });
        Ok(())
    }

    /// Coarse age relative to `now`, e.g. `3h ago`.
    pub fn time_ago(&self, now: DateTime<Utc>) -> String {
        let age = now.signed_duration_since(self.created_at);
        if age.num_days() > 0 {
            format!("{}d ago", age.num_days())
        } else if age.num_hours() > 0 {
            format!("{}h ago", age.num_hours())
        } else if age.num_minutes() > 0 {
            format!("{}m ago", age.num_minutes())
        } else {
            "just now".to_string()
        }
    }

    /// Processing time of a finished job, e.g. `1h 2m 5s`.
    pub fn duration_string(&self) -> Option<String> {
        if self.status != JobStatus::Done {
            return None;
        }
        let total = self.elapsed_seconds.filter(|s| *s > 0)?;
        let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);

        Some(if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        })
    }
}

/// A progress message recorded against a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobLogEntry {
    pub job_id: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl JobLogEntry {
    pub fn new(job_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            timestamp: Utc::now(),
            message: message.into(),
        }
    }

    /// `<RFC 3339 timestamp> <message>`.
    pub fn formatted(&self) -> String {
        format!("{} {}", self.timestamp.to_rfc3339(), self.message)
    }
}

/// Persistence for jobs and their logs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job.
    async fn create_job(&self, job: &Job) -> Result<()>;

    /// Overwrite an existing job. Fails with `NotFound` if it no longer exists.
    async fn update_job(&self, job: &Job) -> Result<()>;

    async fn find_job(&self, job_id: &str) -> Result<Option<Job>>;

    /// Delete a job and its logs. Returns whether a job was deleted.
    async fn delete_job(&self, job_id: &str) -> Result<bool>;

    /// Append a log entry to a job.
    async fn append_log(&self, entry: &JobLogEntry) -> Result<()>;

    /// Log entries of a job, oldest first. Entries with equal timestamps keep insertion order.
    async fn list_logs(&self, job_id: &str) -> Result<Vec<JobLogEntry>>;

    async fn find_by_status(&self, status: JobStatus) -> Result<Vec<Job>>;

    /// Most recently created jobs first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<Job>>;
}
