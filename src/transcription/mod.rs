//! Transcription module for Podscribe.
//!
//! Speech recognition produces per-token timings; the aligner attributes those tokens to
//! diarized speakers and the formatter renders the result as WhisperX JSON.

mod aligner;
mod format;
mod models;
mod whisper;

pub use aligner::{SpeakerWordAligner, DEFAULT_MIN_SEGMENT_SECONDS, UNKNOWN_SPEAKER};
pub use format::{OutputFormatter, WhisperXFormatter, WhisperXSegment, WhisperXTranscript, WhisperXWord};
pub use models::{AlignedSegment, AlignedWord, AsrResult, TokenTiming};
pub use whisper::WhisperAsr;

use crate::error::Result;
use async_trait::async_trait;

/// Trait for speech recognition capabilities.
#[async_trait]
pub trait AsrCapability: Send + Sync {
    /// Load models or clients. May download on first use; calling it again is harmless.
    async fn initialize(&self) -> Result<()>;

    /// Transcribe canonical 16 kHz mono samples into text with per-token timings.
    async fn transcribe(&self, samples: &[f32]) -> Result<AsrResult>;
}
