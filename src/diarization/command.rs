//! Diarizers backed by external programs.
//!
//! Samples are written to a scratch WAV file and the program is invoked with its
//! configured arguments followed by the WAV path. It prints a JSON document with a
//! `segments` array on stdout.

use super::{
    DiarizationResult, Diarizer, FallbackDiarizer, IndexedSpeakerSegment, TimedSpeakerSegment,
};
use crate::audio::{write_wav, SAMPLE_RATE};
use crate::config::{DiarizationSettings, FallbackSettings};
use crate::error::{PodscribeError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info, instrument};

#[derive(Debug, Deserialize)]
struct SegmentsOutput<T> {
    segments: Vec<T>,
}

/// Run `program args... [wav]` and return its stdout.
async fn run_program(program: &str, args: &[String], wav: Option<&Path>) -> Result<Vec<u8>> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(path) = wav {
        cmd.arg(path);
    }

    let output = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PodscribeError::ToolNotFound(program.to_string()),
            _ => PodscribeError::ToolFailed(format!("failed to run {}: {}", program, e)),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PodscribeError::ToolFailed(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            stderr.trim()
        )));
    }

    Ok(output.stdout)
}

/// Write samples to a scratch WAV file that lives as long as the returned handle.
fn scratch_wav(samples: &[f32]) -> Result<NamedTempFile> {
    let file = tempfile::Builder::new()
        .prefix("podscribe-diarize-")
        .suffix(".wav")
        .tempfile()?;
    write_wav(file.path(), samples, SAMPLE_RATE)?;
    Ok(file)
}

fn parse_segments<T: DeserializeOwned>(program: &str, stdout: &[u8]) -> Result<Vec<T>> {
    serde_json::from_slice::<SegmentsOutput<T>>(stdout)
        .map(|out| out.segments)
        .map_err(|e| PodscribeError::ToolFailed(format!("unexpected output from {}: {}", program, e)))
}

async fn run_prepare(prepare: Option<&Vec<String>>) -> Result<()> {
    match prepare.and_then(|argv| argv.split_first()) {
        Some((program, args)) => run_program(program, args, None).await.map(|_| ()),
        None => Ok(()),
    }
}

/// Attribute a helper error to the stage that hit it.
fn in_stage(stage: fn(String) -> PodscribeError) -> impl Fn(PodscribeError) -> PodscribeError {
    move |e| stage(e.to_string())
}

// ============================================================================
// Primary diarizer
// ============================================================================

/// Primary diarizer driven by an external program emitting labeled segments.
pub struct CommandDiarizer {
    settings: DiarizationSettings,
}

impl CommandDiarizer {
    pub fn new(settings: DiarizationSettings) -> Self {
        Self { settings }
    }
}

impl Default for CommandDiarizer {
    fn default() -> Self {
        Self::new(DiarizationSettings::default())
    }
}

#[async_trait]
impl Diarizer for CommandDiarizer {
    async fn prepare(&self) -> Result<()> {
        run_prepare(self.settings.prepare_command.as_ref())
            .await
            .map_err(in_stage(PodscribeError::Diarization))?;
        info!("Diarizer ready ({})", self.settings.command);
        Ok(())
    }

    #[instrument(skip(self, samples), fields(samples = samples.len()))]
    async fn process(&self, samples: &[f32]) -> Result<DiarizationResult> {
        let stage = in_stage(PodscribeError::Diarization);
        let wav = scratch_wav(samples).map_err(&stage)?;
        let stdout = run_program(&self.settings.command, &self.settings.args, Some(wav.path()))
            .await
            .map_err(&stage)?;
        let segments: Vec<TimedSpeakerSegment> =
            parse_segments(&self.settings.command, &stdout).map_err(&stage)?;

        debug!("Diarizer returned {} segments", segments.len());
        Ok(DiarizationResult::new(segments))
    }
}

// ============================================================================
// Fallback diarizer
// ============================================================================

/// Fallback diarizer driven by an external program emitting indexed segments.
pub struct CommandFallbackDiarizer {
    settings: FallbackSettings,
    scratch: Option<NamedTempFile>,
}

impl CommandFallbackDiarizer {
    pub fn new(settings: FallbackSettings) -> Self {
        Self {
            settings,
            scratch: None,
        }
    }
}

impl Default for CommandFallbackDiarizer {
    fn default() -> Self {
        Self::new(FallbackSettings::default())
    }
}

#[async_trait]
impl FallbackDiarizer for CommandFallbackDiarizer {
    async fn initialize(&mut self) -> Result<()> {
        run_prepare(self.settings.prepare_command.as_ref())
            .await
            .map_err(in_stage(PodscribeError::FallbackInit))?;
        info!("Fallback diarizer ready ({})", self.settings.command);
        Ok(())
    }

    fn reset(&mut self) {
        // Dropping the handle deletes the previous run's WAV file.
        self.scratch = None;
    }

    #[instrument(skip(self, samples), fields(samples = samples.len()))]
    async fn process(&mut self, samples: &[f32]) -> Result<Vec<IndexedSpeakerSegment>> {
        let stage = in_stage(PodscribeError::FallbackRun);
        let wav = scratch_wav(samples).map_err(&stage)?;
        let stdout = run_program(&self.settings.command, &self.settings.args, Some(wav.path()))
            .await
            .map_err(&stage);
        self.scratch = Some(wav);

        let segments = parse_segments(&self.settings.command, &stdout?).map_err(&stage)?;
        debug!("Fallback diarizer returned {} segments", segments.len());
        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_labeled_segments() {
        let stdout = br#"{"segments": [
            {"speaker": "SPEAKER_00", "start": 0.0, "end": 2.5, "score": 0.8},
            {"speaker": "SPEAKER_01", "start": 2.5, "end": 4.0}
        ]}"#;

        let segments: Vec<TimedSpeakerSegment> = parse_segments("pyannote", stdout).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].speaker, "SPEAKER_00");
        assert_eq!(segments[0].score, 0.8);
        assert_eq!(segments[1].score, 1.0);
    }

    #[test]
    fn test_parse_indexed_segments() {
        let stdout = br#"{"segments": [{"speaker_index": 1, "start": 0.5, "end": 1.0}]}"#;

        let segments: Vec<IndexedSpeakerSegment> = parse_segments("sortformer", stdout).unwrap();
        assert_eq!(
            segments,
            vec![IndexedSpeakerSegment {
                speaker_index: 1,
                start: 0.5,
                end: 1.0
            }]
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = parse_segments::<TimedSpeakerSegment>("pyannote", b"not json").unwrap_err();
        assert!(matches!(err, PodscribeError::ToolFailed(ref m) if m.contains("unexpected output from pyannote")));
    }

    #[tokio::test]
    async fn test_failing_program_reports_stderr() {
        let args = vec!["-c".to_string(), "echo model missing >&2; exit 3".to_string()];
        let err = run_program("sh", &args, None).await.unwrap_err();
        assert!(matches!(err, PodscribeError::ToolFailed(ref m) if m.contains("model missing")));

        let err = run_program("podscribe-no-such-program", &[], None).await.unwrap_err();
        assert!(matches!(err, PodscribeError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_program_is_diarization_error() {
        let diarizer = CommandDiarizer::new(DiarizationSettings {
            command: "podscribe-no-such-program".to_string(),
            args: Vec::new(),
            prepare_command: None,
        });

        let err = diarizer.process(&[0.0; 1600]).await.unwrap_err();
        assert!(matches!(err, PodscribeError::Diarization(ref m) if m.contains("not found")));
    }

    #[tokio::test]
    async fn test_missing_prepare_program_is_init_error() {
        let mut fallback = CommandFallbackDiarizer::new(FallbackSettings {
            command: "podscribe-no-such-program".to_string(),
            args: Vec::new(),
            prepare_command: Some(vec!["podscribe-no-such-program".to_string()]),
        });

        let err = fallback.initialize().await.unwrap_err();
        assert!(matches!(err, PodscribeError::FallbackInit(ref m) if m.contains("podscribe-no-such-program")));
    }

    #[tokio::test]
    async fn test_prepare_without_command_is_noop() {
        assert!(CommandDiarizer::default().prepare().await.is_ok());
    }
}
