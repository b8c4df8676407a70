//! OpenAI Whisper speech recognition with word-level timestamps.

use super::{AsrCapability, AsrResult, TokenTiming};
use crate::audio::{encode_wav, SAMPLE_RATE};
use crate::config::AsrSettings;
use crate::error::{PodscribeError, Result};
use crate::openai::{create_client_with_timeout, is_api_key_configured};
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    AudioResponseFormat, CreateTranscriptionRequestArgs, CreateTranscriptionResponseVerboseJson,
    TimestampGranularity,
};
use async_openai::Client;
use async_trait::async_trait;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Whisper-based recognizer.
///
/// Long recordings are sent as consecutive fixed-size windows (the API caps upload size);
/// token times are shifted by each window's offset.
pub struct WhisperAsr {
    client: OnceLock<Client<OpenAIConfig>>,
    model: String,
    language: Option<String>,
    chunk_seconds: u32,
    timeout: Duration,
}

impl WhisperAsr {
    pub fn new() -> Self {
        Self::with_config(&AsrSettings::default())
    }

    pub fn with_config(settings: &AsrSettings) -> Self {
        Self {
            client: OnceLock::new(),
            model: settings.model.clone(),
            language: settings.language.clone(),
            chunk_seconds: settings.chunk_seconds.max(1),
            timeout: Duration::from_secs(settings.timeout_seconds),
        }
    }

    fn client(&self) -> Result<&Client<OpenAIConfig>> {
        self.client
            .get()
            .ok_or_else(|| PodscribeError::Transcription("Whisper client not initialized".into()))
    }

    /// Transcribe one window of samples. Times are relative to the window start.
    #[instrument(skip(self, samples), fields(samples = samples.len()))]
    async fn transcribe_window(&self, samples: &[f32]) -> Result<CreateTranscriptionResponseVerboseJson> {
        let wav = encode_wav(samples, SAMPLE_RATE)?;

        let mut request_builder = CreateTranscriptionRequestArgs::default();
        request_builder
            .file(async_openai::types::AudioInput::from_vec_u8(
                "audio.wav".to_string(),
                wav,
            ))
            .model(&self.model)
            .response_format(AudioResponseFormat::VerboseJson)
            .timestamp_granularities(vec![TimestampGranularity::Word, TimestampGranularity::Segment]);

        if let Some(lang) = &self.language {
            request_builder.language(lang);
        }

        let request = request_builder.build().map_err(|e| {
            PodscribeError::Transcription(format!("Failed to build request: {}", e))
        })?;

        self.client()?
            .audio()
            .transcribe_verbose_json(request)
            .await
            .map_err(|e| PodscribeError::OpenAI(format!("Whisper API error: {}", e)))
    }
}

impl Default for WhisperAsr {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert one verbose response into tokens shifted by `offset` seconds.
///
/// Whisper does not score individual words, so each word takes the confidence of the
/// segment containing it (`exp(avg_logprob)`), or 1.0 when segments are missing.
fn tokens_from_response(
    response: &CreateTranscriptionResponseVerboseJson,
    offset: f64,
) -> Vec<TokenTiming> {
    let segment_scores: Vec<(f64, f64, f32)> = response
        .segments
        .as_ref()
        .map(|segs| {
            segs.iter()
                .map(|s| (s.start as f64, s.end as f64, s.avg_logprob.exp().clamp(0.0, 1.0)))
                .collect()
        })
        .unwrap_or_default();

    let score_at = |time: f64| {
        segment_scores
            .iter()
            .find(|(start, end, _)| time >= *start && time <= *end)
            .map(|(_, _, score)| *score)
            .unwrap_or(1.0)
    };

    match &response.words {
        Some(words) => words
            .iter()
            .filter(|w| !w.word.trim().is_empty())
            .map(|w| {
                let (start, end) = (w.start as f64, w.end as f64);
                TokenTiming::new(
                    format!(" {}", w.word.trim()),
                    offset + start,
                    offset + end,
                    score_at((start + end) / 2.0),
                )
            })
            .collect(),
        None => Vec::new(),
    }
}

/// Mean of per-segment confidences, or 1.0 when there are none.
fn overall_confidence(tokens: &[TokenTiming]) -> f32 {
    if tokens.is_empty() {
        return 1.0;
    }
    tokens.iter().map(|t| t.confidence).sum::<f32>() / tokens.len() as f32
}

#[async_trait]
impl AsrCapability for WhisperAsr {
    async fn initialize(&self) -> Result<()> {
        if self.client.get().is_some() {
            return Ok(());
        }
        if !is_api_key_configured() {
            return Err(PodscribeError::Config(
                "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
            ));
        }
        let client = create_client_with_timeout(self.timeout)?;
        let _ = self.client.set(client);
        info!("Whisper client ready ({})", self.model);
        Ok(())
    }

    #[instrument(skip(self, samples), fields(samples = samples.len()))]
    async fn transcribe(&self, samples: &[f32]) -> Result<AsrResult> {
        let window = self.chunk_seconds as usize * SAMPLE_RATE as usize;
        let window_count = samples.len().div_ceil(window);
        info!("Transcribing {} window(s) with {}", window_count, self.model);

        let mut tokens = Vec::new();
        for (idx, chunk) in samples.chunks(window).enumerate() {
            let offset = (idx * window) as f64 / SAMPLE_RATE as f64;
            let response = self.transcribe_window(chunk).await.map_err(|e| {
                PodscribeError::Transcription(format!("Window {} at {:.0}s failed: {}", idx, offset, e))
            })?;

            let window_tokens = tokens_from_response(&response, offset);
            if window_tokens.is_empty() && !response.text.trim().is_empty() {
                warn!("Window at {:.0}s returned text without word timestamps", offset);
            }
            debug!("Window at {:.0}s: {} words", offset, window_tokens.len());
            tokens.extend(window_tokens);
        }

        let text = tokens.iter().map(|t| t.token.as_str()).collect::<String>().trim().to_string();
        let confidence = overall_confidence(&tokens);

        Ok(AsrResult {
            text,
            token_timings: tokens,
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: serde_json::Value) -> CreateTranscriptionResponseVerboseJson {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_tokens_are_offset_and_spaced() {
        let response = response(serde_json::json!({
            "language": "english",
            "duration": 2.0,
            "text": "Hello world",
            "words": [
                {"word": "Hello", "start": 0.0, "end": 0.5},
                {"word": "world", "start": 0.5, "end": 1.0}
            ]
        }));

        let tokens = tokens_from_response(&response, 300.0);
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].token, " Hello");
        assert_eq!(tokens[0].start, 300.0);
        assert_eq!(tokens[1].end, 301.0);
        assert_eq!(tokens[1].confidence, 1.0);
    }

    #[test]
    fn test_missing_words_yield_no_tokens() {
        let response = response(serde_json::json!({
            "language": "english",
            "duration": 2.0,
            "text": "Hello world"
        }));

        assert!(tokens_from_response(&response, 0.0).is_empty());
    }

    #[test]
    fn test_overall_confidence() {
        let tokens = vec![
            TokenTiming::new(" a", 0.0, 1.0, 0.5),
            TokenTiming::new(" b", 1.0, 2.0, 1.0),
        ];
        assert_eq!(overall_confidence(&tokens), 0.75);
        assert_eq!(overall_confidence(&[]), 1.0);
    }

    #[tokio::test]
    async fn test_transcribe_requires_initialize() {
        let asr = WhisperAsr::new();
        let err = asr.transcribe_window(&[0.0; 160]).await.unwrap_err();
        assert!(matches!(err, PodscribeError::Transcription(_)));
    }
}
