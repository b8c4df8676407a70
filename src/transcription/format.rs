//! Transcript output formatting.
//!
//! Produces the WhisperX JSON layout: a single `segments` array whose entries carry the
//! speaker, the time span, the text and the individual words.

use super::AlignedSegment;
use crate::error::{PodscribeError, Result};
use serde::Serialize;

/// Serializes aligned segments into an output artifact.
pub trait OutputFormatter: Send + Sync {
    /// Encode the segments as artifact bytes.
    fn serialize(&self, segments: &[AlignedSegment]) -> Result<Vec<u8>>;

    /// File extension of the produced artifact.
    fn extension(&self) -> &'static str {
        "json"
    }
}

/// JSON-serializable transcript in WhisperX layout.
///
/// Fields are declared in alphabetical order so the output keys are sorted.
#[derive(Debug, Serialize)]
pub struct WhisperXTranscript {
    pub segments: Vec<WhisperXSegment>,
}

#[derive(Debug, Serialize)]
pub struct WhisperXSegment {
    pub end: f64,
    pub speaker: String,
    pub start: f64,
    pub text: String,
    pub words: Vec<WhisperXWord>,
}

#[derive(Debug, Serialize)]
pub struct WhisperXWord {
    pub end: f64,
    pub score: f32,
    pub speaker: String,
    pub start: f64,
    pub word: String,
}

impl From<&[AlignedSegment]> for WhisperXTranscript {
    fn from(segments: &[AlignedSegment]) -> Self {
        Self {
            segments: segments
                .iter()
                .map(|segment| WhisperXSegment {
                    end: segment.end,
                    speaker: segment.speaker.clone(),
                    start: segment.start,
                    // WhisperX prefixes segment text with exactly one space.
                    text: format!(" {}", segment.text().trim()),
                    words: segment
                        .words
                        .iter()
                        .map(|w| WhisperXWord {
                            end: w.end,
                            score: w.score,
                            speaker: w.speaker.clone(),
                            start: w.start,
                            word: w.word.clone(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Formatter producing pretty-printed WhisperX JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhisperXFormatter;

impl OutputFormatter for WhisperXFormatter {
    fn serialize(&self, segments: &[AlignedSegment]) -> Result<Vec<u8>> {
        let export = WhisperXTranscript::from(segments);
        serde_json::to_vec_pretty(&export).map_err(|e| PodscribeError::Serialization(e.to_string()))
    }
}
