//! Secondary diarization for recordings the primary diarizer collapses to one speaker.

use super::{DiarizationResult, FallbackDiarizer, IndexedSpeakerSegment, TimedSpeakerSegment};
use crate::error::{PodscribeError, Result};
use std::collections::BTreeSet;
use tokio::sync::Mutex;
use tracing::{info, instrument};

struct FallbackState {
    diarizer: Box<dyn FallbackDiarizer>,
    initialized: bool,
}

/// Result of a fallback run.
#[derive(Debug, Clone)]
pub struct FallbackOutcome {
    /// Relabeled fallback segments.
    pub result: DiarizationResult,
    /// Whether this run paid for model initialization.
    pub freshly_initialized: bool,
    /// Speaker indices the fallback model reported, sorted.
    pub active_speakers: Vec<usize>,
}

/// Decides when the fallback diarizer runs and owns its one-time initialization.
///
/// The diarizer sits behind an async mutex: initialization happens under the lock, so a
/// second job arriving mid-download waits instead of loading the models again, and runs
/// never interleave with each other's reset.
pub struct FallbackDiarizationTrigger {
    state: Mutex<FallbackState>,
}

impl FallbackDiarizationTrigger {
    pub fn new(diarizer: Box<dyn FallbackDiarizer>) -> Self {
        Self {
            state: Mutex::new(FallbackState {
                diarizer,
                initialized: false,
            }),
        }
    }

    /// True when the primary result names at most one distinct speaker.
    pub fn should_fallback(&self, primary: &DiarizationResult) -> bool {
        primary.speaker_count() <= 1
    }

    /// Run the fallback diarizer, initializing it on first use.
    ///
    /// A failed initialization leaves the diarizer uninitialized so a later job retries it.
    #[instrument(skip(self, samples), fields(samples = samples.len()))]
    pub async fn run_fallback(&self, samples: &[f32]) -> Result<FallbackOutcome> {
        let mut state = self.state.lock().await;

        let freshly_initialized = !state.initialized;
        if freshly_initialized {
            info!("Initializing fallback diarizer");
            state.diarizer.initialize().await.map_err(|e| match e {
                PodscribeError::FallbackInit(_) => e,
                other => PodscribeError::FallbackInit(other.to_string()),
            })?;
            state.initialized = true;
        }

        state.diarizer.reset();
        let indexed = state.diarizer.process(samples).await.map_err(|e| match e {
            PodscribeError::FallbackRun(_) => e,
            other => PodscribeError::FallbackRun(other.to_string()),
        })?;
        drop(state);

        let active_speakers: Vec<usize> = indexed
            .iter()
            .map(|s| s.speaker_index)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        Ok(FallbackOutcome {
            result: relabel(&indexed),
            freshly_initialized,
            active_speakers,
        })
    }
}

/// Synthetic label for a fallback speaker slot.
pub fn fallback_label(speaker_index: usize) -> String {
    format!("S{}", speaker_index + 1)
}

fn relabel(segments: &[IndexedSpeakerSegment]) -> DiarizationResult {
    DiarizationResult::new(
        segments
            .iter()
            .map(|s| TimedSpeakerSegment::new(fallback_label(s.speaker_index), s.start, s.end, 1.0))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counters {
        inits: AtomicUsize,
        resets: AtomicUsize,
        runs: AtomicUsize,
        fail_init: AtomicBool,
        fail_run: AtomicBool,
    }

    struct MockFallback {
        counters: Arc<Counters>,
        segments: Vec<IndexedSpeakerSegment>,
    }

    #[async_trait]
    impl FallbackDiarizer for MockFallback {
        async fn initialize(&mut self) -> Result<()> {
            self.counters.inits.fetch_add(1, Ordering::SeqCst);
            if self.counters.fail_init.load(Ordering::SeqCst) {
                return Err(PodscribeError::ToolNotFound("sortformer".into()));
            }
            Ok(())
        }

        fn reset(&mut self) {
            self.counters.resets.fetch_add(1, Ordering::SeqCst);
        }

        async fn process(&mut self, _samples: &[f32]) -> Result<Vec<IndexedSpeakerSegment>> {
            self.counters.runs.fetch_add(1, Ordering::SeqCst);
            if self.counters.fail_run.load(Ordering::SeqCst) {
                return Err(PodscribeError::ToolFailed("out of memory".into()));
            }
            Ok(self.segments.clone())
        }
    }

    fn indexed(speaker_index: usize, start: f64, end: f64) -> IndexedSpeakerSegment {
        IndexedSpeakerSegment {
            speaker_index,
            start,
            end,
        }
    }

    fn trigger(counters: &Arc<Counters>) -> FallbackDiarizationTrigger {
        FallbackDiarizationTrigger::new(Box::new(MockFallback {
            counters: counters.clone(),
            segments: vec![indexed(0, 0.0, 2.0), indexed(2, 2.0, 4.0), indexed(0, 4.0, 5.0)],
        }))
    }

    fn primary(labels: &[&str]) -> DiarizationResult {
        DiarizationResult::new(
            labels
                .iter()
                .enumerate()
                .map(|(i, l)| TimedSpeakerSegment::new(*l, i as f64, i as f64 + 1.0, 1.0))
                .collect(),
        )
    }

    #[test]
    fn test_should_fallback() {
        let counters = Arc::new(Counters::default());
        let trigger = trigger(&counters);

        assert!(trigger.should_fallback(&primary(&[])));
        assert!(trigger.should_fallback(&primary(&["A"])));
        assert!(trigger.should_fallback(&primary(&["A", "A", "A"])));
        assert!(!trigger.should_fallback(&primary(&["A", "B"])));
        assert!(!trigger.should_fallback(&primary(&["A", "B", "A", "C"])));
    }

    #[tokio::test]
    async fn test_initializes_once_and_resets_every_run() {
        let counters = Arc::new(Counters::default());
        let trigger = trigger(&counters);

        let first = trigger.run_fallback(&[0.0; 16]).await.unwrap();
        let second = trigger.run_fallback(&[0.0; 16]).await.unwrap();

        assert!(first.freshly_initialized);
        assert!(!second.freshly_initialized);
        assert_eq!(counters.inits.load(Ordering::SeqCst), 1);
        assert_eq!(counters.resets.load(Ordering::SeqCst), 2);
        assert_eq!(counters.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_runs_initialize_once() {
        let counters = Arc::new(Counters::default());
        let trigger = Arc::new(trigger(&counters));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let trigger = trigger.clone();
                tokio::spawn(async move { trigger.run_fallback(&[0.0; 16]).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(counters.inits.load(Ordering::SeqCst), 1);
        assert_eq!(counters.runs.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_labels_follow_speaker_index() {
        let counters = Arc::new(Counters::default());
        let outcome = trigger(&counters).run_fallback(&[0.0; 16]).await.unwrap();

        let labels: Vec<&str> = outcome
            .result
            .segments
            .iter()
            .map(|s| s.speaker.as_str())
            .collect();
        assert_eq!(labels, vec!["S1", "S3", "S1"]);
        assert_eq!(outcome.active_speakers, vec![0, 2]);
        assert_eq!(outcome.result.speaker_count(), 2);
    }

    #[tokio::test]
    async fn test_init_failure_is_retried_later() {
        let counters = Arc::new(Counters::default());
        counters.fail_init.store(true, Ordering::SeqCst);
        let trigger = trigger(&counters);

        let err = trigger.run_fallback(&[0.0; 16]).await.unwrap_err();
        assert!(matches!(err, PodscribeError::FallbackInit(_)));
        assert!(err.is_diarization());
        assert_eq!(counters.runs.load(Ordering::SeqCst), 0);

        counters.fail_init.store(false, Ordering::SeqCst);
        let outcome = trigger.run_fallback(&[0.0; 16]).await.unwrap();
        assert!(outcome.freshly_initialized);
        assert_eq!(counters.inits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_run_failure_is_fallback_run_error() {
        let counters = Arc::new(Counters::default());
        counters.fail_run.store(true, Ordering::SeqCst);
        let trigger = trigger(&counters);

        let err = trigger.run_fallback(&[0.0; 16]).await.unwrap_err();
        assert!(matches!(err, PodscribeError::FallbackRun(_)));
        assert!(err.is_diarization());
    }
}
