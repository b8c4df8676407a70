//! Data models for transcription and alignment.

use serde::{Deserialize, Serialize};

// ============================================================================
// Recognizer output
// ============================================================================

/// A single recognized token with timing and confidence.
///
/// Token text follows the recognizer's own spacing convention: word-initial tokens carry
/// a leading space, continuation tokens do not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenTiming {
    /// Token text.
    pub token: String,
    /// Start time in seconds.
    pub start: f64,
    /// End time in seconds.
    pub end: f64,
    /// Recognizer confidence (0.0-1.0).
    pub confidence: f32,
}

impl TokenTiming {
    pub fn new(token: impl Into<String>, start: f64, end: f64, confidence: f32) -> Self {
        Self {
            token: token.into(),
            start,
            end,
            confidence,
        }
    }

    /// Midpoint of the token in seconds.
    pub fn midpoint(&self) -> f64 {
        (self.start + self.end) / 2.0
    }
}

/// Result of a speech recognition run.
#[derive(Debug, Clone, Default)]
pub struct AsrResult {
    /// Full recognized text.
    pub text: String,
    /// Per-token timings in time order.
    pub token_timings: Vec<TokenTiming>,
    /// Overall confidence (0.0-1.0).
    pub confidence: f32,
}

// ============================================================================
// Aligned output
// ============================================================================

/// A token with its timing and the speaker it was attributed to.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedWord {
    pub word: String,
    pub start: f64,
    pub end: f64,
    pub score: f32,
    pub speaker: String,
}

/// A run of words attributed to one speaker.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedSegment {
    /// Speaker the run is attributed to.
    pub speaker: String,
    /// Start of the first word.
    pub start: f64,
    /// End of the last word.
    pub end: f64,
    /// Words in time order. Each keeps its own speaker label, which can differ from the
    /// segment speaker when a short speaker change was smoothed away.
    pub words: Vec<AlignedWord>,
}

impl AlignedSegment {
    /// Concatenated word text. Tokens carry their own leading spaces, so no separator is added.
    pub fn text(&self) -> String {
        self.words.iter().map(|w| w.word.as_str()).collect()
    }

    /// Duration of this segment in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, start: f64, end: f64) -> AlignedWord {
        AlignedWord {
            word: text.to_string(),
            start,
            end,
            score: 0.9,
            speaker: "S1".to_string(),
        }
    }

    #[test]
    fn test_segment_text_keeps_token_spacing() {
        let segment = AlignedSegment {
            speaker: "S1".to_string(),
            start: 0.0,
            end: 1.5,
            words: vec![word(" Hel", 0.0, 0.3), word("lo", 0.3, 0.5), word(" world", 0.5, 1.5)],
        };

        assert_eq!(segment.text(), " Hello world");
        assert_eq!(segment.duration(), 1.5);
    }

    #[test]
    fn test_token_midpoint() {
        let token = TokenTiming::new(" hi", 1.0, 2.0, 1.0);
        assert_eq!(token.midpoint(), 1.5);
    }
}
