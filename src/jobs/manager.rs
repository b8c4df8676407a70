//! Job lifecycle: submission, background execution, polling and cleanup.

use super::{Job, JobLogEntry, JobStatus, JobStore, SqliteJobStore};
use crate::config::Settings;
use crate::error::{PodscribeError, Result};
use crate::pipeline::TranscriptionPipeline;
use crate::storage::ArtifactStore;
use serde::Serialize;
use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Reply to a successful submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub job_id: String,
    pub status: JobStatus,
}

/// Outcome of polling for a job's transcript.
#[derive(Debug)]
pub enum JobResult {
    /// Still NEW or RUNNING.
    Pending(JobStatus),
    /// The transcript. It has been removed from storage and will not be returned again.
    Ready(Vec<u8>),
}

/// Owns job records and runs the pipeline for each submission in the background.
///
/// Cloning is cheap; clones share the store, artifact storage and pipeline.
#[derive(Clone)]
pub struct JobManager {
    store: Arc<dyn JobStore>,
    artifacts: ArtifactStore,
    pipeline: Arc<TranscriptionPipeline>,
}

impl JobManager {
    /// Manager backed by the configured SQLite database, work directory and models.
    pub fn new(settings: &Settings) -> Result<Self> {
        let store: Arc<dyn JobStore> = Arc::new(SqliteJobStore::new(&settings.database_path())?);
        let artifacts = ArtifactStore::new(settings.work_dir());
        let pipeline = Arc::new(TranscriptionPipeline::new(
            settings,
            store.clone(),
            artifacts.clone(),
        ));
        Ok(Self::with_components(store, artifacts, pipeline))
    }

    pub fn with_components(
        store: Arc<dyn JobStore>,
        artifacts: ArtifactStore,
        pipeline: Arc<TranscriptionPipeline>,
    ) -> Self {
        Self {
            store,
            artifacts,
            pipeline,
        }
    }

    /// Create a job for uploaded audio and start processing it in the background.
    ///
    /// Returns as soon as the job is recorded; the job is still NEW at that point.
    #[instrument(skip(self, audio), fields(bytes = audio.len()))]
    pub async fn submit(&self, podcast: &str, episode: &str, audio: &[u8]) -> Result<Submission> {
        let (podcast, episode) = (podcast.trim(), episode.trim());
        if podcast.is_empty() {
            return Err(PodscribeError::Validation("podcast is required".into()));
        }
        if episode.is_empty() {
            return Err(PodscribeError::Validation("episode is required".into()));
        }
        if audio.is_empty() {
            return Err(PodscribeError::Validation("audio file is empty".into()));
        }

        let job = Job::new(podcast, episode);
        self.store.create_job(&job).await?;

        let audio_path = match self.artifacts.write_upload(&job.job_id, audio).await {
            Ok(path) => path,
            Err(e) => {
                // Without its audio the job could never run.
                self.store.delete_job(&job.job_id).await?;
                return Err(e);
            }
        };

        self.pipeline
            .log(&job, format!("Job created for {} episode {}", podcast, episode))
            .await;
        info!("Submitted job {}", job.job_id);

        let manager = self.clone();
        let job_id = job.job_id.clone();
        tokio::spawn(async move { manager.execute(job_id, audio_path).await });

        Ok(Submission {
            job_id: job.job_id,
            status: job.status,
        })
    }

    pub async fn get_status(&self, job_id: &str) -> Result<Job> {
        self.store
            .find_job(job_id)
            .await?
            .ok_or_else(|| PodscribeError::NotFound(job_id.to_string()))
    }

    /// Poll for a job's transcript.
    ///
    /// A finished transcript is handed out once and then deleted. A failed job is reported
    /// as a processing error; its cause is only in the job's log entries.
    pub async fn get_result(&self, job_id: &str) -> Result<JobResult> {
        let job = self.get_status(job_id).await?;

        match job.status {
            JobStatus::New | JobStatus::Running => Ok(JobResult::Pending(job.status)),
            JobStatus::Failed => Err(PodscribeError::Processing(format!(
                "job {} failed, see its log for details",
                job_id
            ))),
            JobStatus::Done => {
                let location = job
                    .output_location
                    .ok_or_else(|| PodscribeError::OutputMissing(job_id.to_string()))?;
                match self.artifacts.take(Path::new(&location)).await? {
                    Some(bytes) => {
                        debug!("Delivered transcript for job {}", job_id);
                        Ok(JobResult::Ready(bytes))
                    }
                    None => Err(PodscribeError::OutputMissing(job_id.to_string())),
                }
            }
        }
    }

    /// Delete every RUNNING job, its logs and its work directory. Returns how many were deleted.
    ///
    /// A job that is genuinely still running is deleted too; its task finishes on its own
    /// and discards the result.
    #[instrument(skip(self))]
    pub async fn cleanup_stuck(&self) -> Result<usize> {
        let mut deleted = 0;
        for job in self.store.find_by_status(JobStatus::Running).await? {
            if self.store.delete_job(&job.job_id).await? {
                deleted += 1;
            }
            if let Err(e) = self.artifacts.remove_job(&job.job_id).await {
                warn!("Failed to remove files of job {}: {}", job.job_id, e);
            }
        }
        info!("Deleted {} stuck job(s)", deleted);
        Ok(deleted)
    }

    /// Most recently created jobs first.
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<Job>> {
        self.store.list_recent(limit).await
    }

    /// A job's log entries, oldest first.
    pub async fn logs(&self, job_id: &str) -> Result<Vec<JobLogEntry>> {
        self.get_status(job_id).await?;
        self.store.list_logs(job_id).await
    }

    /// Background body of one job. Never returns an error: every outcome ends up in the
    /// job record or its log.
    #[instrument(skip(self, audio_path))]
    async fn execute(self, job_id: String, audio_path: PathBuf) {
        let started = Instant::now();

        if let Some(job) = self.claim(&job_id).await {
            let pipeline = self.pipeline.clone();
            let run_job = job.clone();
            let run_path = audio_path.clone();

            // The inner task turns a panic anywhere in the pipeline into a JoinError.
            let outcome = tokio::spawn(async move { pipeline.run(&run_job, &run_path).await }).await;
            let elapsed = started.elapsed().as_secs() as i64;

            match outcome {
                Ok(Ok(location)) => self.finish(job, elapsed, location).await,
                // The pipeline already logged the failing stage.
                Ok(Err(e)) => self.fail(job, None, &e.to_string()).await,
                Err(join_error) => {
                    let cause = if join_error.is_panic() {
                        format!("pipeline panicked: {}", panic_message(join_error.into_panic()))
                    } else {
                        "pipeline task was cancelled".to_string()
                    };
                    let message = format!("ERROR: {}", cause);
                    self.fail(job, Some(message), &cause).await;
                }
            }
        }

        if let Err(e) = self.artifacts.remove(&audio_path).await {
            warn!("Failed to remove upload {}: {}", audio_path.display(), e);
        }
    }

    /// Move a NEW job to RUNNING. Anything else means another run owns it, or it is gone.
    async fn claim(&self, job_id: &str) -> Option<Job> {
        let mut job = match self.store.find_job(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!("Job {} disappeared before it started", job_id);
                return None;
            }
            Err(e) => {
                error!("Failed to load job {}: {}", job_id, e);
                return None;
            }
        };

        if job.status != JobStatus::New {
            warn!("Job {} is {}, not starting it again", job_id, job.status);
            return None;
        }
        if let Err(e) = job.mark_running() {
            error!("{}", e);
            return None;
        }
        if let Err(e) = self.store.update_job(&job).await {
            error!("Failed to mark job {} running: {}", job_id, e);
            return None;
        }
        Some(job)
    }

    async fn finish(&self, mut job: Job, elapsed: i64, location: String) {
        if let Err(e) = job.mark_done(elapsed, location.clone()) {
            error!("{}", e);
            return;
        }

        match self.store.update_job(&job).await {
            Ok(()) => info!("Job {} done in {}s", job.job_id, elapsed),
            Err(PodscribeError::NotFound(_)) => {
                // Deleted by cleanup while running; nobody can fetch the transcript now.
                warn!("Job {} was deleted while running, discarding output", job.job_id);
                if let Err(e) = self.artifacts.remove(Path::new(&location)).await {
                    warn!("Failed to remove output {}: {}", location, e);
                }
            }
            Err(e) => error!("Failed to record completion of job {}: {}", job.job_id, e),
        }
    }

    async fn fail(&self, mut job: Job, log_message: Option<String>, cause: &str) {
        if let Some(message) = log_message {
            self.pipeline.log(&job, message).await;
        }
        if let Err(e) = job.mark_failed(1) {
            error!("{}", e);
            return;
        }

        match self.store.update_job(&job).await {
            Ok(()) => warn!("Job {} failed: {}", job.job_id, cause),
            Err(PodscribeError::NotFound(_)) => {
                debug!("Job {} was deleted while running", job.job_id)
            }
            Err(e) => error!("Failed to record failure of job {}: {}", job.job_id, e),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
