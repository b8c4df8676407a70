//! Speaker attribution: fuses recognizer token timings with diarization segments.
//!
//! Each token is attributed to the speaker active at its midpoint (or the nearest speaker
//! segment when it falls in a gap). Consecutive tokens are then grouped into speaker runs.
//! Diarization boundaries are unreliable below a couple of seconds, so a speaker change
//! only closes a run once that run has lasted at least `min_segment_seconds`; shorter
//! changes stay in the current run.

use super::{AlignedSegment, AlignedWord, TokenTiming};
use crate::diarization::TimedSpeakerSegment;
use std::cmp::Ordering;
use tracing::debug;

/// Label used when no diarization segments are available at all.
pub const UNKNOWN_SPEAKER: &str = "SPEAKER_UNKNOWN";

/// Default minimum run duration before a speaker change is honored.
pub const DEFAULT_MIN_SEGMENT_SECONDS: f64 = 2.0;

/// Aligns recognizer tokens with speaker segments.
#[derive(Debug, Clone)]
pub struct SpeakerWordAligner {
    min_segment_seconds: f64,
}

impl Default for SpeakerWordAligner {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_SEGMENT_SECONDS)
    }
}

impl SpeakerWordAligner {
    pub fn new(min_segment_seconds: f64) -> Self {
        Self {
            min_segment_seconds,
        }
    }

    /// Attribute every token to a speaker and group tokens into speaker runs.
    ///
    /// Returns an empty vector when there are no tokens.
    pub fn align(
        &self,
        tokens: &[TokenTiming],
        speaker_segments: &[TimedSpeakerSegment],
    ) -> Vec<AlignedSegment> {
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut sorted: Vec<&TimedSpeakerSegment> = speaker_segments.iter().collect();
        sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

        let words: Vec<AlignedWord> = tokens
            .iter()
            .map(|token| AlignedWord {
                word: token.token.clone(),
                start: token.start,
                end: token.end,
                score: token.confidence,
                speaker: find_speaker(token, &sorted).to_string(),
            })
            .collect();

        let segments = self.group(words);
        debug!(
            "Aligned {} tokens into {} segments",
            tokens.len(),
            segments.len()
        );
        segments
    }

    /// Group attributed words into runs, smoothing short speaker changes.
    fn group(&self, words: Vec<AlignedWord>) -> Vec<AlignedSegment> {
        let mut segments = Vec::new();
        let mut run: Option<Run> = None;

        for word in words {
            let closes_run = run.as_ref().is_some_and(|current| {
                word.speaker != current.speaker && current.duration() >= self.min_segment_seconds
            });
            if closes_run {
                if let Some(closed) = run.take() {
                    segments.push(closed.finish());
                }
            }

            match run.as_mut() {
                Some(current) => current.push(word),
                None => run = Some(Run::start(word)),
            }
        }

        if let Some(last) = run {
            segments.push(last.finish());
        }

        segments
    }
}

/// A run of words under one nominal speaker.
struct Run {
    speaker: String,
    start: f64,
    end: f64,
    words: Vec<AlignedWord>,
}

impl Run {
    fn start(word: AlignedWord) -> Self {
        Self {
            speaker: word.speaker.clone(),
            start: word.start,
            end: word.end,
            words: vec![word],
        }
    }

    fn push(&mut self, word: AlignedWord) {
        self.end = word.end;
        self.words.push(word);
    }

    fn duration(&self) -> f64 {
        self.end - self.start
    }

    fn finish(self) -> AlignedSegment {
        AlignedSegment {
            speaker: self.speaker,
            start: self.start,
            end: self.end,
            words: self.words,
        }
    }
}

/// Speaker for a token: the first segment containing its midpoint, otherwise the segment
/// with the nearest boundary (earlier segment on ties).
fn find_speaker<'a>(token: &TokenTiming, sorted: &[&'a TimedSpeakerSegment]) -> &'a str {
    let midpoint = token.midpoint();

    if let Some(segment) = sorted
        .iter()
        .find(|s| midpoint >= s.start && midpoint <= s.end)
    {
        return &segment.speaker;
    }

    let mut closest: Option<(&'a TimedSpeakerSegment, f64)> = None;
    for segment in sorted {
        let distance = (midpoint - segment.start)
            .abs()
            .min((midpoint - segment.end).abs());
        let closer = match closest {
            None => true,
            Some((_, best)) => distance.total_cmp(&best) == Ordering::Less,
        };
        if closer {
            closest = Some((segment, distance));
        }
    }

    closest
        .map(|(segment, _)| segment.speaker.as_str())
        .unwrap_or(UNKNOWN_SPEAKER)
}
