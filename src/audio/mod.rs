//! Audio decoding and encoding.
//!
//! Uploaded audio is decoded once into a canonical 16 kHz mono `f32` sample stream that
//! every model consumes. Models that need a file on disk get a WAV rendition of it.

mod converter;
mod wav;

pub use converter::FfmpegConverter;
pub use wav::{encode_wav, write_wav};

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Canonical sample rate of decoded audio.
pub const SAMPLE_RATE: u32 = 16_000;

/// Trait for audio decoders.
#[async_trait]
pub trait AudioConverter: Send + Sync {
    /// Decode an audio file into mono samples at the canonical sample rate.
    async fn resample(&self, path: &Path) -> Result<Vec<f32>>;
}

/// Duration in whole seconds of a sample stream at the canonical rate.
pub fn duration_seconds(samples: &[f32]) -> usize {
    samples.len() / SAMPLE_RATE as usize
}
