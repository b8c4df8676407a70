//! Pre-flight checks before expensive operations.
//!
//! Validates that required tools and configuration are available
//! before starting operations that would otherwise fail midway.

use crate::config::Settings;
use crate::error::{PodscribeError, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Transcription needs the API key, ffmpeg and both diarizer programs.
    Transcribe,
    /// Job bookkeeping only needs the database.
    Jobs,
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(settings: &Settings, operation: Operation) -> Result<()> {
    match operation {
        Operation::Transcribe => {
            check_api_key()?;
            check_tool(&settings.audio.ffmpeg)?;
            check_program(&settings.diarization.command)?;
            check_program(&settings.fallback.command)?;
        }
        Operation::Jobs => {
            // No external requirements
        }
    }
    Ok(())
}

/// Check if OpenAI API key is configured.
pub fn check_api_key() -> Result<()> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() => Ok(()),
        Ok(_) => Err(PodscribeError::Config(
            "OPENAI_API_KEY is empty. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
        Err(_) => Err(PodscribeError::Config(
            "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
    }
}

/// Check that ffmpeg runs.
fn check_tool(name: &str) -> Result<()> {
    tool_version(name).map(|_| ())
}

/// Run `name -version` and return the first line it prints.
pub fn tool_version(name: &str) -> Result<String> {
    match Command::new(name).arg("-version").output() {
        Ok(output) if output.status.success() => Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string()),
        Ok(output) => Err(PodscribeError::ToolFailed(format!(
            "{} -version exited with {}",
            name, output.status
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(PodscribeError::ToolNotFound(name.to_string()))
        }
        Err(e) => Err(PodscribeError::ToolNotFound(format!("{}: {}", name, e))),
    }
}

/// Check that a program exists without running it; diarizers have no common version flag.
fn check_program(name: &str) -> Result<()> {
    find_program(name)
        .map(|_| ())
        .ok_or_else(|| PodscribeError::ToolNotFound(name.to_string()))
}

/// Resolve a program name the way the shell would: paths as given, bare names via PATH.
pub fn find_program(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join(name))
            .find(|path| path.is_file())
    })
}
