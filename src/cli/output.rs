//! CLI output formatting utilities.

use crate::jobs::{Job, JobLogEntry, JobStatus};
use chrono::{DateTime, Utc};
use console::{style, StyledObject};
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print one job as a listing row.
    pub fn job_row(job: &Job, now: DateTime<Utc>) {
        let duration = job
            .duration_string()
            .map(|d| format!(", took {}", d))
            .unwrap_or_default();
        println!(
            "  {} {} {} episode {} ({}{})",
            status_style(job.status),
            style(&job.job_id).dim(),
            style(&job.podcast).bold(),
            job.episode,
            job.time_ago(now),
            duration
        );
    }

    /// Print one job log entry.
    pub fn log_entry(entry: &JobLogEntry) {
        let line = entry.formatted();
        if entry.message.starts_with("ERROR") {
            println!("  {}", style(line).red());
        } else if entry.message.starts_with("WARNING") {
            println!("  {}", style(line).yellow());
        } else {
            println!("  {}", line);
        }
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(spinner_style);
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

fn status_style(status: JobStatus) -> StyledObject<String> {
    let label = format!("{:<7}", status.as_str());
    match status {
        JobStatus::New => style(label).cyan(),
        JobStatus::Running => style(label).yellow(),
        JobStatus::Done => style(label).green(),
        JobStatus::Failed => style(label).red(),
    }
}
