//! Doctor command: verify that jobs can run on this machine.
//!
//! Tool and API key checks are shared with the pre-flight checks. On top of those, the doctor
//! looks at the state podscribe itself owns: the job database, the work directory and the
//! diarizers' prepare commands.

use crate::cli::preflight::{check_api_key, find_program, tool_version};
use crate::cli::Output;
use crate::config::Settings;
use crate::jobs::{JobStatus, JobStore, SqliteJobStore};
use console::style;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Pass,
    Warn,
    Fail,
}

/// One diagnosed item.
#[derive(Debug)]
struct Finding {
    label: String,
    verdict: Verdict,
    detail: String,
}

impl Finding {
    fn new(label: impl Into<String>, verdict: Verdict, detail: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            verdict,
            detail: detail.into(),
        }
    }

    fn render(&self) {
        let mark = match self.verdict {
            Verdict::Pass => style("ok  ").green(),
            Verdict::Warn => style("warn").yellow(),
            Verdict::Fail => style("FAIL").red().bold(),
        };
        println!("  [{}] {:<20} {}", mark, self.label, style(&self.detail).dim());
    }
}

/// Run all diagnostic checks. Fails if any check found a problem that breaks jobs.
pub async fn run_doctor(settings: &Settings, config_path: Option<&str>) -> anyhow::Result<()> {
    Output::header("Podscribe Doctor");

    let sections = [
        ("Models and tools", model_findings(settings)),
        ("Storage", storage_findings(settings).await),
        ("Configuration", vec![config_finding(config_path)]),
    ];

    let mut failures = 0;
    let mut warnings = 0;
    for (title, findings) in &sections {
        println!();
        println!("{}", style(title).bold());
        for finding in findings {
            finding.render();
            match finding.verdict {
                Verdict::Fail => failures += 1,
                Verdict::Warn => warnings += 1,
                Verdict::Pass => {}
            }
        }
    }
    println!();

    if failures > 0 {
        anyhow::bail!("{} check(s) failed; jobs will fail until they are fixed", failures);
    }
    if warnings > 0 {
        Output::warning(&format!("Ready, with {} warning(s).", warnings));
    } else {
        Output::success("Ready to transcribe.");
    }
    Ok(())
}

fn model_findings(settings: &Settings) -> Vec<Finding> {
    let mut findings = vec![
        match tool_version(&settings.audio.ffmpeg) {
            Ok(version) => Finding::new("ffmpeg", Verdict::Pass, version),
            Err(e) => Finding::new("ffmpeg", Verdict::Fail, e.to_string()),
        },
        match check_api_key() {
            Ok(()) => Finding::new("OPENAI_API_KEY", Verdict::Pass, "set"),
            Err(e) => Finding::new("OPENAI_API_KEY", Verdict::Fail, e.to_string()),
        },
    ];

    for (label, command, prepare) in [
        (
            "Diarizer",
            &settings.diarization.command,
            settings.diarization.prepare_command.as_ref(),
        ),
        (
            "Fallback diarizer",
            &settings.fallback.command,
            settings.fallback.prepare_command.as_ref(),
        ),
    ] {
        findings.push(program_finding(label, command));
        if let Some(program) = prepare.and_then(|argv| argv.first()) {
            findings.push(program_finding(&format!("{} prepare", label), program));
        }
    }

    findings
}

fn program_finding(label: &str, program: &str) -> Finding {
    match find_program(program) {
        Some(path) => Finding::new(label, Verdict::Pass, path.display().to_string()),
        None => Finding::new(label, Verdict::Fail, format!("{} not found", program)),
    }
}

async fn storage_findings(settings: &Settings) -> Vec<Finding> {
    vec![
        work_dir_finding(&settings.work_dir()),
        database_finding(&settings.database_path()).await,
    ]
}

/// The work directory must accept new files; uploads and transcripts land there.
fn work_dir_finding(work_dir: &Path) -> Finding {
    let writable = std::fs::create_dir_all(work_dir).and_then(|_| tempfile::tempfile_in(work_dir));
    match writable {
        Ok(_) => Finding::new("Work directory", Verdict::Pass, work_dir.display().to_string()),
        Err(e) => Finding::new(
            "Work directory",
            Verdict::Fail,
            format!("{} is not writable: {}", work_dir.display(), e),
        ),
    }
}

/// Open an existing job database and summarize its jobs. Never creates one.
async fn database_finding(path: &Path) -> Finding {
    if !path.exists() {
        return Finding::new(
            "Job database",
            Verdict::Warn,
            format!("{} (created on first job)", path.display()),
        );
    }

    let store = match SqliteJobStore::new(path) {
        Ok(store) => store,
        Err(e) => return Finding::new("Job database", Verdict::Fail, e.to_string()),
    };

    let mut counts = Vec::new();
    let mut running = 0;
    for status in [
        JobStatus::New,
        JobStatus::Running,
        JobStatus::Done,
        JobStatus::Failed,
    ] {
        match store.find_by_status(status).await {
            Ok(jobs) => {
                if status == JobStatus::Running {
                    running = jobs.len();
                }
                counts.push(format!("{} {}", jobs.len(), status));
            }
            Err(e) => return Finding::new("Job database", Verdict::Fail, e.to_string()),
        }
    }

    let detail = format!("{} ({})", path.display(), counts.join(", "));
    if running > 0 {
        Finding::new(
            "Job database",
            Verdict::Warn,
            format!("{}; run 'podscribe cleanup' if no service is running", detail),
        )
    } else {
        Finding::new("Job database", Verdict::Pass, detail)
    }
}

fn config_finding(config_path: Option<&str>) -> Finding {
    let path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(Settings::default_config_path);
    if path.exists() {
        Finding::new("Config file", Verdict::Pass, path.display().to_string())
    } else {
        Finding::new(
            "Config file",
            Verdict::Warn,
            format!("{} missing, using defaults ('podscribe config init' writes one)", path.display()),
        )
    }
}
