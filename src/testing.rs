//! Capability mocks shared by unit tests.

use crate::audio::AudioConverter;
use crate::diarization::{
    DiarizationResult, Diarizer, FallbackDiarizer, IndexedSpeakerSegment, TimedSpeakerSegment,
};
use crate::error::{PodscribeError, Result};
use crate::pipeline::PipelineComponents;
use crate::transcription::{AsrCapability, AsrResult, TokenTiming, WhisperXFormatter};
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Six seconds of audio at 16 kHz.
pub(crate) const SAMPLE_COUNT: usize = 96_000;

#[derive(Default)]
pub(crate) struct Counters {
    pub asr_inits: AtomicUsize,
    pub diarizer_prepares: AtomicUsize,
    pub fallback_inits: AtomicUsize,
    pub fallback_runs: AtomicUsize,
    pub fail_audio: AtomicBool,
    pub fail_fallback_init: AtomicBool,
    pub panic_asr: AtomicBool,
    /// When set, transcription waits for `Mocks::release`.
    pub hold_asr: AtomicBool,
    /// When set, ASR initialization and diarizer preparation each wait for `Mocks::release`.
    pub hold_init: AtomicBool,
}

pub(crate) struct Mocks {
    pub counters: Arc<Counters>,
    gate: Arc<Notify>,
    tokens: Vec<TokenTiming>,
    primary: Vec<TimedSpeakerSegment>,
    fallback: Vec<IndexedSpeakerSegment>,
}

impl Mocks {
    /// One-second words over six seconds, speaker A then B.
    pub fn two_speakers() -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            gate: Arc::new(Notify::new()),
            tokens: (0..6)
                .map(|i| TokenTiming::new(format!(" w{}", i), i as f64, (i + 1) as f64, 0.9))
                .collect(),
            primary: vec![
                TimedSpeakerSegment::new("A", 0.0, 3.0, 0.9),
                TimedSpeakerSegment::new("B", 3.0, 6.0, 0.9),
            ],
            fallback: vec![
                IndexedSpeakerSegment { speaker_index: 0, start: 0.0, end: 3.0 },
                IndexedSpeakerSegment { speaker_index: 1, start: 3.0, end: 6.0 },
            ],
        }
    }

    /// Same words, but the primary diarizer hears only one speaker.
    pub fn single_speaker() -> Self {
        Self {
            primary: vec![TimedSpeakerSegment::new("A", 0.0, 6.0, 0.9)],
            ..Self::two_speakers()
        }
    }

    pub fn with_tokens(mut self, tokens: Vec<TokenTiming>) -> Self {
        self.tokens = tokens;
        self
    }

    /// Let a held call continue.
    pub fn release(&self) {
        self.gate.notify_one();
    }
}

struct MockConverter {
    counters: Arc<Counters>,
}

#[async_trait]
impl AudioConverter for MockConverter {
    async fn resample(&self, _path: &Path) -> Result<Vec<f32>> {
        if self.counters.fail_audio.load(Ordering::SeqCst) {
            return Err(PodscribeError::AudioLoad("corrupt header".into()));
        }
        Ok(vec![0.0; SAMPLE_COUNT])
    }
}

struct MockAsr {
    counters: Arc<Counters>,
    gate: Arc<Notify>,
    tokens: Vec<TokenTiming>,
}

#[async_trait]
impl AsrCapability for MockAsr {
    async fn initialize(&self) -> Result<()> {
        self.counters.asr_inits.fetch_add(1, Ordering::SeqCst);
        if self.counters.hold_init.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }
        Ok(())
    }

    async fn transcribe(&self, _samples: &[f32]) -> Result<AsrResult> {
        if self.counters.hold_asr.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }
        if self.counters.panic_asr.load(Ordering::SeqCst) {
            panic!("recognizer crashed");
        }
        Ok(AsrResult {
            text: self.tokens.iter().map(|t| t.token.as_str()).collect(),
            token_timings: self.tokens.clone(),
            confidence: 0.9,
        })
    }
}

struct MockDiarizer {
    counters: Arc<Counters>,
    gate: Arc<Notify>,
    segments: Vec<TimedSpeakerSegment>,
}

#[async_trait]
impl Diarizer for MockDiarizer {
    async fn prepare(&self) -> Result<()> {
        self.counters.diarizer_prepares.fetch_add(1, Ordering::SeqCst);
        if self.counters.hold_init.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }
        Ok(())
    }

    async fn process(&self, _samples: &[f32]) -> Result<DiarizationResult> {
        Ok(DiarizationResult::new(self.segments.clone()))
    }
}

struct MockFallback {
    counters: Arc<Counters>,
    segments: Vec<IndexedSpeakerSegment>,
}

#[async_trait]
impl FallbackDiarizer for MockFallback {
    async fn initialize(&mut self) -> Result<()> {
        self.counters.fallback_inits.fetch_add(1, Ordering::SeqCst);
        if self.counters.fail_fallback_init.load(Ordering::SeqCst) {
            return Err(PodscribeError::FallbackInit("model download failed".into()));
        }
        Ok(())
    }

    fn reset(&mut self) {}

    async fn process(&mut self, _samples: &[f32]) -> Result<Vec<IndexedSpeakerSegment>> {
        self.counters.fallback_runs.fetch_add(1, Ordering::SeqCst);
        Ok(self.segments.clone())
    }
}

/// Pipeline components backed by `mocks`.
pub(crate) fn components(mocks: &Mocks) -> PipelineComponents {
    PipelineComponents {
        converter: Arc::new(MockConverter {
            counters: mocks.counters.clone(),
        }),
        asr: Arc::new(MockAsr {
            counters: mocks.counters.clone(),
            gate: mocks.gate.clone(),
            tokens: mocks.tokens.clone(),
        }),
        diarizer: Arc::new(MockDiarizer {
            counters: mocks.counters.clone(),
            gate: mocks.gate.clone(),
            segments: mocks.primary.clone(),
        }),
        fallback: Box::new(MockFallback {
            counters: mocks.counters.clone(),
            segments: mocks.fallback.clone(),
        }),
        formatter: Arc::new(WhisperXFormatter),
    }
}
