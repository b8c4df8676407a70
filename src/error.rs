//! Error types for Podscribe.

use thiserror::Error;

/// Library-level error type for Podscribe operations.
#[derive(Error, Debug)]
pub enum PodscribeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid submission: {0}")]
    Validation(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Failed to load audio: {0}")]
    AudioLoad(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Diarization failed: {0}")]
    Diarization(String),

    #[error("Fallback diarizer failed to initialize: {0}")]
    FallbackInit(String),

    #[error("Fallback diarizer failed: {0}")]
    FallbackRun(String),

    #[error("Failed to serialize transcript: {0}")]
    Serialization(String),

    #[error("Transcription job failed: {0}")]
    Processing(String),

    #[error("Output missing for job {0}")]
    OutputMissing(String),

    #[error("Invalid status transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: String,
        to: String,
    },

    #[error("Job store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("WAV encoding error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("External tool failed: {0}")]
    ToolFailed(String),
}

impl PodscribeError {
    /// Whether this error belongs to the diarization stage (including the fallback diarizer).
    pub fn is_diarization(&self) -> bool {
        matches!(
            self,
            PodscribeError::Diarization(_)
                | PodscribeError::FallbackInit(_)
                | PodscribeError::FallbackRun(_)
        )
    }
}

/// Result type alias for Podscribe operations.
pub type Result<T> = std::result::Result<T, PodscribeError>;
