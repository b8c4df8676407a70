//! Speaker diarization.
//!
//! Diarizers split audio into speaker turns independently of the words spoken. The primary
//! diarizer labels speakers itself; the fallback diarizer reports a numeric speaker index
//! and is only consulted when the primary one collapses to a single speaker.

mod command;
mod fallback;

pub use command::{CommandDiarizer, CommandFallbackDiarizer};
pub use fallback::{FallbackDiarizationTrigger, FallbackOutcome};

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A speaker turn from a diarizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedSpeakerSegment {
    /// Speaker label.
    pub speaker: String,
    /// Start time in seconds.
    pub start: f64,
    /// End time in seconds.
    pub end: f64,
    /// Diarizer quality score for this turn.
    #[serde(default = "default_score")]
    pub score: f32,
}

fn default_score() -> f32 {
    1.0
}

impl TimedSpeakerSegment {
    pub fn new(speaker: impl Into<String>, start: f64, end: f64, score: f32) -> Self {
        Self {
            speaker: speaker.into(),
            start,
            end,
            score,
        }
    }
}

/// A speaker turn from the fallback diarizer, identified by speaker slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedSpeakerSegment {
    pub speaker_index: usize,
    pub start: f64,
    pub end: f64,
}

/// Diarization output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiarizationResult {
    pub segments: Vec<TimedSpeakerSegment>,
}

impl DiarizationResult {
    pub fn new(segments: Vec<TimedSpeakerSegment>) -> Self {
        Self { segments }
    }

    /// Distinct speaker labels, sorted.
    pub fn speakers(&self) -> BTreeSet<&str> {
        self.segments.iter().map(|s| s.speaker.as_str()).collect()
    }

    /// Number of distinct speakers.
    pub fn speaker_count(&self) -> usize {
        self.speakers().len()
    }

    /// Human-readable summary used in job logs.
    pub fn summary(&self) -> String {
        let speakers = self.speakers();
        format!(
            "{} segments, {} speakers ({})",
            self.segments.len(),
            speakers.len(),
            speakers.into_iter().collect::<Vec<_>>().join(", ")
        )
    }
}

/// Trait for the primary diarizer.
#[async_trait]
pub trait Diarizer: Send + Sync {
    /// Load models. Calling it again is harmless.
    async fn prepare(&self) -> Result<()>;

    /// Diarize canonical 16 kHz mono samples.
    async fn process(&self, samples: &[f32]) -> Result<DiarizationResult>;
}

/// Trait for the fallback diarizer. Implementations may keep state between runs, which
/// `reset` discards.
#[async_trait]
pub trait FallbackDiarizer: Send {
    /// Download and load models.
    async fn initialize(&mut self) -> Result<()>;

    /// Clear state left by a previous run.
    fn reset(&mut self);

    /// Diarize canonical 16 kHz mono samples.
    async fn process(&mut self, samples: &[f32]) -> Result<Vec<IndexedSpeakerSegment>>;
}
