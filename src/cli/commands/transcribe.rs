//! Transcribe command implementation.
//!
//! Runs the same job lifecycle as the HTTP service, then polls the job until it finishes.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::jobs::{JobManager, JobResult, JobStatus};
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Run the transcribe command.
pub async fn run_transcribe(
    file: &Path,
    podcast: &str,
    episode: &str,
    output: Option<PathBuf>,
    settings: Settings,
) -> Result<()> {
    if let Err(e) = preflight::check(&settings, Operation::Transcribe) {
        Output::error(&format!("{}", e));
        Output::info("Run 'podscribe doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let audio = tokio::fs::read(file)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", file.display(), e))?;

    let manager = JobManager::new(&settings)?;
    let submission = manager.submit(podcast, episode, &audio).await?;
    Output::info(&format!("Created job {}", submission.job_id));

    let spinner = Output::spinner("Waiting for job to start...");
    let job = loop {
        let job = manager.get_status(&submission.job_id).await?;
        if let Some(latest) = manager.logs(&job.job_id).await?.last() {
            spinner.set_message(latest.message.clone());
        }
        if job.status.is_terminal() {
            break job;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    };
    spinner.finish_and_clear();

    if job.status == JobStatus::Failed {
        Output::error(&format!("Job {} failed", job.job_id));
        for entry in manager.logs(&job.job_id).await? {
            Output::log_entry(&entry);
        }
        anyhow::bail!("transcription failed");
    }

    let bytes = match manager.get_result(&job.job_id).await? {
        JobResult::Ready(bytes) => bytes,
        JobResult::Pending(status) => anyhow::bail!("job is unexpectedly {}", status),
    };

    match output {
        Some(path) => {
            tokio::fs::write(&path, &bytes).await?;
            Output::success(&format!(
                "Transcript written to {} ({})",
                path.display(),
                job.duration_string().unwrap_or_else(|| "under a second".to_string())
            ));
        }
        None => println!("{}", String::from_utf8_lossy(&bytes)),
    }

    Ok(())
}
