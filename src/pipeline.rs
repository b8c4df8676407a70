//! Transcription pipeline.
//!
//! Runs one job end to end: decode audio, recognize words, diarize (with fallback),
//! attribute words to speakers and write the transcript. Progress is recorded as job log
//! entries, which are the only way a polling client sees what the pipeline is doing.

use crate::audio::{duration_seconds, AudioConverter, FfmpegConverter};
use crate::config::{PipelineSettings, Settings};
use crate::diarization::{
    CommandDiarizer, CommandFallbackDiarizer, DiarizationResult, Diarizer,
    FallbackDiarizationTrigger, FallbackDiarizer,
};
use crate::error::{PodscribeError, Result};
use crate::jobs::{Job, JobLogEntry, JobStore};
use crate::storage::ArtifactStore;
use crate::transcription::{
    AlignedSegment, AsrCapability, AsrResult, OutputFormatter, SpeakerWordAligner, WhisperAsr,
    WhisperXFormatter,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, OnceCell};
use tracing::{info, instrument, warn};

/// The external capabilities a pipeline drives.
pub struct PipelineComponents {
    pub converter: Arc<dyn AudioConverter>,
    pub asr: Arc<dyn AsrCapability>,
    pub diarizer: Arc<dyn Diarizer>,
    pub fallback: Box<dyn FallbackDiarizer>,
    pub formatter: Arc<dyn OutputFormatter>,
}

impl PipelineComponents {
    /// Production components: ffmpeg, Whisper, external diarizers, WhisperX JSON.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            converter: Arc::new(FfmpegConverter::with_binary(&settings.audio.ffmpeg)),
            asr: Arc::new(WhisperAsr::with_config(&settings.asr)),
            diarizer: Arc::new(CommandDiarizer::new(settings.diarization.clone())),
            fallback: Box::new(CommandFallbackDiarizer::new(settings.fallback.clone())),
            formatter: Arc::new(WhisperXFormatter),
        }
    }
}

/// Sequences the processing stages for a job.
///
/// The recognizer and the primary diarizer are prepared at most once per pipeline, the
/// first time a job needs them; concurrent first jobs wait for the same initialization.
pub struct TranscriptionPipeline {
    converter: Arc<dyn AudioConverter>,
    asr: Arc<dyn AsrCapability>,
    diarizer: Arc<dyn Diarizer>,
    fallback: FallbackDiarizationTrigger,
    formatter: Arc<dyn OutputFormatter>,
    aligner: SpeakerWordAligner,
    store: Arc<dyn JobStore>,
    artifacts: ArtifactStore,
    asr_ready: OnceCell<()>,
    diarizer_ready: OnceCell<()>,
    /// Present when model inference must not overlap across jobs.
    inference: Option<Mutex<()>>,
}

impl TranscriptionPipeline {
    pub fn new(settings: &Settings, store: Arc<dyn JobStore>, artifacts: ArtifactStore) -> Self {
        Self::with_components(
            PipelineComponents::from_settings(settings),
            &settings.pipeline,
            store,
            artifacts,
        )
    }

    pub fn with_components(
        components: PipelineComponents,
        settings: &PipelineSettings,
        store: Arc<dyn JobStore>,
        artifacts: ArtifactStore,
    ) -> Self {
        Self {
            converter: components.converter,
            asr: components.asr,
            diarizer: components.diarizer,
            fallback: FallbackDiarizationTrigger::new(components.fallback),
            formatter: components.formatter,
            aligner: SpeakerWordAligner::new(settings.min_segment_seconds),
            store,
            artifacts,
            asr_ready: OnceCell::new(),
            diarizer_ready: OnceCell::new(),
            inference: settings.serialize_inference.then(|| Mutex::new(())),
        }
    }

    /// Process a job's audio and return where the transcript was written.
    ///
    /// Stage failures are logged against the job before being returned.
    #[instrument(skip(self, job), fields(job_id = %job.job_id))]
    pub async fn run(&self, job: &Job, audio_path: &Path) -> Result<String> {
        self.log(
            job,
            format!(
                "Starting audio processing for {} episode {}",
                job.podcast, job.episode
            ),
        )
        .await;

        let samples = self.stage(job, self.load_audio(audio_path)).await?;
        self.log(
            job,
            format!(
                "Audio loaded: {} samples ({} seconds)",
                samples.len(),
                duration_seconds(&samples)
            ),
        )
        .await;

        self.log(job, "Running speech-to-text transcription").await;
        let asr = self.stage(job, self.transcribe(job, &samples)).await?;
        self.log(
            job,
            format!(
                "Transcription complete: {} characters, {} words, confidence {:.2}",
                asr.text.chars().count(),
                asr.token_timings.len(),
                asr.confidence
            ),
        )
        .await;

        self.log(job, "Running speaker diarization").await;
        let diarization = self.stage(job, self.diarize(job, &samples)).await?;

        self.log(job, "Aligning words with speakers").await;
        let segments = self.aligner.align(&asr.token_timings, &diarization.segments);
        self.log(job, format!("Alignment complete: {} segments", segments.len()))
            .await;

        let output_path = self.artifacts.output_path(
            &job.job_id,
            &job.podcast,
            &job.episode,
            self.formatter.extension(),
        );
        self.log(job, "Building WhisperX format output").await;
        self.stage(job, self.write_output(&segments, &output_path)).await?;

        let location = output_path.to_string_lossy().into_owned();
        self.log(job, format!("Output saved to: {}", location)).await;
        self.log(job, "Processing complete!").await;
        Ok(location)
    }

    async fn load_audio(&self, audio_path: &Path) -> Result<Vec<f32>> {
        let samples = self
            .converter
            .resample(audio_path)
            .await
            .map_err(|e| match e {
                PodscribeError::AudioLoad(_) => e,
                other => PodscribeError::AudioLoad(other.to_string()),
            })?;

        if samples.is_empty() {
            return Err(PodscribeError::AudioLoad("decoded audio is empty".into()));
        }
        Ok(samples)
    }

    async fn run_asr(&self, job: &Job, samples: &[f32]) -> Result<AsrResult> {
        self.asr_ready
            .get_or_try_init(|| async {
                self.log(job, "Initializing speech recognition").await;
                self.asr.initialize().await
            })
            .await?;

        let _guard = self.inference_guard().await;
        self.asr.transcribe(samples).await
    }

    async fn transcribe(&self, job: &Job, samples: &[f32]) -> Result<AsrResult> {
        let result = self.run_asr(job, samples).await.map_err(|e| match e {
            PodscribeError::Transcription(_) => e,
            other => PodscribeError::Transcription(other.to_string()),
        })?;

        if result.token_timings.is_empty() {
            return Err(PodscribeError::Transcription(
                "recognizer returned no word timings".into(),
            ));
        }
        Ok(result)
    }

    async fn run_primary(&self, job: &Job, samples: &[f32]) -> Result<DiarizationResult> {
        self.diarizer_ready
            .get_or_try_init(|| async {
                self.log(job, "Initializing diarizer").await;
                self.diarizer.prepare().await
            })
            .await?;

        let _guard = self.inference_guard().await;
        self.diarizer.process(samples).await
    }

    async fn diarize(&self, job: &Job, samples: &[f32]) -> Result<DiarizationResult> {
        let primary = self.run_primary(job, samples).await.map_err(|e| {
            if e.is_diarization() {
                e
            } else {
                PodscribeError::Diarization(e.to_string())
            }
        })?;
        self.log(job, format!("Offline diarization: {}", primary.summary()))
            .await;

        if !self.fallback.should_fallback(&primary) {
            return Ok(primary);
        }

        self.log(
            job,
            format!(
                "WARNING: Diarizer found {} speaker(s), falling back to secondary diarizer",
                primary.speaker_count()
            ),
        )
        .await;

        let outcome = {
            let _guard = self.inference_guard().await;
            self.fallback.run_fallback(samples).await?
        };
        if outcome.freshly_initialized {
            self.log(job, "Fallback diarizer initialized").await;
        }
        self.log(
            job,
            format!(
                "Fallback diarization: {}; active speaker indices {:?}",
                outcome.result.summary(),
                outcome.active_speakers
            ),
        )
        .await;

        Ok(outcome.result)
    }

    async fn write_output(&self, segments: &[AlignedSegment], path: &Path) -> Result<()> {
        let bytes = self.formatter.serialize(segments)?;
        self.artifacts.write_output(path, &bytes).await
    }

    async fn inference_guard(&self) -> Option<MutexGuard<'_, ()>> {
        match &self.inference {
            Some(lock) => Some(lock.lock().await),
            None => None,
        }
    }

    /// Await a stage, logging its error against the job before passing it on.
    async fn stage<T>(
        &self,
        job: &Job,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        match fut.await {
            Ok(value) => Ok(value),
            Err(e) => {
                self.log(job, format!("ERROR: {}", e)).await;
                Err(e)
            }
        }
    }

    /// Record a progress message for a job and mirror it to tracing.
    ///
    /// A job deleted mid-run (stuck-job cleanup) can no longer take log entries; that is
    /// reported but does not stop the run.
    pub(crate) async fn log(&self, job: &Job, message: impl Into<String>) {
        let entry = JobLogEntry::new(&job.job_id, message);
        info!(job_id = %job.job_id, "{}", entry.message);
        if let Err(e) = self.store.append_log(&entry).await {
            warn!(job_id = %job.job_id, "Failed to record job log: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::MemoryJobStore;
    use crate::testing::{components, Mocks};
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn setup(mocks: &Mocks) -> (TranscriptionPipeline, Arc<MemoryJobStore>, Job, TempDir) {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryJobStore::new());
        let job = Job::new("The Show", "7");
        store.create_job(&job).await.unwrap();

        let pipeline = TranscriptionPipeline::with_components(
            components(mocks),
            &PipelineSettings::default(),
            store.clone(),
            ArtifactStore::new(temp.path()),
        );
        (pipeline, store, job, temp)
    }

    async fn messages(store: &MemoryJobStore, job: &Job) -> Vec<String> {
        store
            .list_logs(&job.job_id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.message)
            .collect()
    }

    #[tokio::test]
    async fn test_run_writes_transcript() {
        let mocks = Mocks::two_speakers();
        let (pipeline, store, job, temp) = setup(&mocks).await;

        let location = pipeline.run(&job, Path::new("upload.mp3")).await.unwrap();
        assert!(location.starts_with(temp.path().to_str().unwrap()));
        assert!(location.ends_with("The_Show_7_transcription.json"));

        let bytes = std::fs::read(&location).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let segments = value["segments"].as_array().unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0]["speaker"], "A");
        assert_eq!(segments[1]["speaker"], "B");

        let logs = messages(&store, &job).await;
        assert_eq!(logs[0], "Starting audio processing for The Show episode 7");
        assert!(logs.iter().any(|m| m.starts_with("Audio loaded: 96000 samples (6 seconds)")));
        let expected = [
            "Running speech-to-text transcription",
            "Running speaker diarization",
            "Aligning words with speakers",
            "Building WhisperX format output",
        ];
        let milestones: Vec<&str> = logs
            .iter()
            .map(String::as_str)
            .filter(|m| expected.contains(m))
            .collect();
        assert_eq!(milestones, expected);
        assert!(logs.iter().any(|m| m.starts_with("Offline diarization: 2 segments, 2 speakers (A, B)")));
        assert!(!logs.iter().any(|m| m.starts_with("WARNING")));
        assert_eq!(logs.last().unwrap(), "Processing complete!");
        assert_eq!(mocks.counters.fallback_runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_single_speaker_triggers_fallback() {
        let mocks = Mocks::single_speaker();
        let (pipeline, store, job, _temp) = setup(&mocks).await;

        let location = pipeline.run(&job, Path::new("upload.mp3")).await.unwrap();
        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&location).unwrap()).unwrap();
        assert_eq!(value["segments"][0]["speaker"], "S1");
        assert_eq!(value["segments"][1]["speaker"], "S2");

        let logs = messages(&store, &job).await;
        assert!(logs.iter().any(|m| m.starts_with("WARNING: Diarizer found 1 speaker(s)")));
        assert!(logs.iter().any(|m| m == "Fallback diarizer initialized"));
        assert_eq!(mocks.counters.fallback_runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_models_initialized_once_across_runs() {
        let mocks = Mocks::two_speakers();
        let (pipeline, store, job, _temp) = setup(&mocks).await;
        let second = Job::new("The Show", "8");
        store.create_job(&second).await.unwrap();

        pipeline.run(&job, Path::new("a.mp3")).await.unwrap();
        pipeline.run(&second, Path::new("b.mp3")).await.unwrap();

        assert_eq!(mocks.counters.asr_inits.load(Ordering::SeqCst), 1);
        assert_eq!(mocks.counters.diarizer_prepares.load(Ordering::SeqCst), 1);
        assert!(messages(&store, &second)
            .await
            .iter()
            .all(|m| m != "Initializing speech recognition"));
    }

    #[tokio::test]
    async fn test_concurrent_first_runs_share_initialization() {
        let mocks = Mocks::two_speakers();
        mocks.counters.hold_init.store(true, Ordering::SeqCst);
        let (pipeline, store, job, _temp) = setup(&mocks).await;
        let second = Job::new("The Show", "8");
        store.create_job(&second).await.unwrap();

        let both_logged = |message: &'static str| {
            let store = store.clone();
            let jobs = [job.clone(), second.clone()];
            async move {
                for job in &jobs {
                    while !messages(&store, job).await.iter().any(|m| m == message) {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                    }
                }
            }
        };
        let control = async {
            // Both runs are past audio loading while the first initialization is held.
            both_logged("Running speech-to-text transcription").await;
            while mocks.counters.asr_inits.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            mocks.release();

            both_logged("Running speaker diarization").await;
            while mocks.counters.diarizer_prepares.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            mocks.release();
        };

        let (first, other, ()) = tokio::time::timeout(Duration::from_secs(10), async {
            tokio::join!(
                pipeline.run(&job, Path::new("a.mp3")),
                pipeline.run(&second, Path::new("b.mp3")),
                control,
            )
        })
        .await
        .unwrap();
        first.unwrap();
        other.unwrap();

        assert_eq!(mocks.counters.asr_inits.load(Ordering::SeqCst), 1);
        assert_eq!(mocks.counters.diarizer_prepares.load(Ordering::SeqCst), 1);
        let mut init_logs = messages(&store, &job).await;
        init_logs.extend(messages(&store, &second).await);
        assert_eq!(
            init_logs
                .iter()
                .filter(|m| m.as_str() == "Initializing speech recognition")
                .count(),
            1
        );
        assert_eq!(
            init_logs.iter().filter(|m| m.as_str() == "Initializing diarizer").count(),
            1
        );
    }

    #[tokio::test]
    async fn test_audio_failure_is_logged_and_returned() {
        let mocks = Mocks::two_speakers();
        mocks.counters.fail_audio.store(true, Ordering::SeqCst);
        let (pipeline, store, job, _temp) = setup(&mocks).await;

        let err = pipeline.run(&job, Path::new("upload.mp3")).await.unwrap_err();
        assert!(matches!(err, PodscribeError::AudioLoad(_)));

        let logs = messages(&store, &job).await;
        assert_eq!(logs.last().unwrap(), "ERROR: Failed to load audio: corrupt header");
        assert_eq!(mocks.counters.asr_inits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_transcription_is_an_error() {
        let mocks = Mocks::two_speakers().with_tokens(Vec::new());
        let (pipeline, _store, job, _temp) = setup(&mocks).await;

        let err = pipeline.run(&job, Path::new("upload.mp3")).await.unwrap_err();
        assert!(matches!(err, PodscribeError::Transcription(_)));
    }

    #[tokio::test]
    async fn test_fallback_init_failure_is_diarization_error() {
        let mocks = Mocks::single_speaker();
        mocks.counters.fail_fallback_init.store(true, Ordering::SeqCst);
        let (pipeline, store, job, _temp) = setup(&mocks).await;

        let err = pipeline.run(&job, Path::new("upload.mp3")).await.unwrap_err();
        assert!(err.is_diarization());

        let logs = messages(&store, &job).await;
        assert!(logs
            .last()
            .unwrap()
            .starts_with("ERROR: Fallback diarizer failed to initialize"));
    }
}
