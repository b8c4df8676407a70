//! Job listing, inspection and cleanup commands.

use crate::cli::Output;
use crate::config::Settings;
use crate::jobs::JobManager;
use anyhow::Result;
use chrono::Utc;

/// Run the jobs command.
pub async fn run_jobs(limit: usize, settings: Settings) -> Result<()> {
    let manager = JobManager::new(&settings)?;
    let jobs = manager.list_recent(limit).await?;

    if jobs.is_empty() {
        Output::info("No jobs yet. Use 'podscribe transcribe <file>' or 'podscribe serve' to add some.");
        return Ok(());
    }

    Output::header(&format!("Recent Jobs ({})", jobs.len()));
    println!();
    let now = Utc::now();
    for job in &jobs {
        Output::job_row(job, now);
    }

    Ok(())
}

/// Run the status command.
pub async fn run_status(job_id: &str, settings: Settings) -> Result<()> {
    let manager = JobManager::new(&settings)?;
    let job = match manager.get_status(job_id).await {
        Ok(job) => job,
        Err(e) => {
            Output::error(&format!("{}", e));
            return Err(e.into());
        }
    };

    Output::header(&format!("Job {}", job.job_id));
    Output::kv("Podcast", &job.podcast);
    Output::kv("Episode", &job.episode);
    Output::kv("Status", job.status.as_str());
    Output::kv("Created", &job.created_at.to_rfc3339());
    if let Some(duration) = job.duration_string() {
        Output::kv("Duration", &duration);
    }
    if let Some(code) = job.return_code {
        Output::kv("Return code", &code.to_string());
    }
    if let Some(location) = &job.output_location {
        Output::kv("Output", location);
    }

    println!();
    for entry in manager.logs(&job.job_id).await? {
        Output::log_entry(&entry);
    }

    Ok(())
}

/// Run the cleanup command.
pub async fn run_cleanup(settings: Settings) -> Result<()> {
    let manager = JobManager::new(&settings)?;
    let deleted = manager.cleanup_stuck().await?;

    if deleted == 0 {
        Output::info("No stuck jobs.");
    } else {
        Output::success(&format!("Deleted {} stuck job(s).", deleted));
    }
    Ok(())
}
