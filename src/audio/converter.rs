//! ffmpeg-backed audio decoding.

use super::{AudioConverter, SAMPLE_RATE};
use crate::error::{PodscribeError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Decodes any format ffmpeg understands into 16 kHz mono `f32` samples.
pub struct FfmpegConverter {
    ffmpeg: String,
}

impl FfmpegConverter {
    pub fn new() -> Self {
        Self::with_binary("ffmpeg")
    }

    pub fn with_binary(ffmpeg: &str) -> Self {
        Self {
            ffmpeg: ffmpeg.to_string(),
        }
    }

    fn command(&self, path: &Path) -> Command {
        let mut command = Command::new(&self.ffmpeg);
        command
            .arg("-nostdin")
            .arg("-loglevel").arg("error")
            .arg("-i").arg(path)
            .arg("-vn")
            .arg("-ac").arg("1")
            .arg("-ar").arg(SAMPLE_RATE.to_string())
            .arg("-f").arg("f32le")
            .arg("pipe:1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }
}

impl Default for FfmpegConverter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioConverter for FfmpegConverter {
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn resample(&self, path: &Path) -> Result<Vec<f32>> {
        if !path.exists() {
            return Err(PodscribeError::AudioLoad(format!(
                "File not found: {}",
                path.display()
            )));
        }

        let result = self.command(path).output().await;

        let output = match result {
            Ok(o) => o,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PodscribeError::AudioLoad(format!(
                    "{} not found in PATH",
                    self.ffmpeg
                )));
            }
            Err(e) => {
                return Err(PodscribeError::AudioLoad(format!("ffmpeg execution failed: {e}")));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PodscribeError::AudioLoad(format!("ffmpeg decode failed: {}", stderr.trim())));
        }

        let samples = decode_f32le(&output.stdout);
        if samples.is_empty() {
            return Err(PodscribeError::AudioLoad("No audio samples decoded".into()));
        }

        debug!("Decoded {} samples", samples.len());
        Ok(samples)
    }
}

/// Interpret raw little-endian `f32` PCM bytes. A trailing partial sample is dropped.
fn decode_f32le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
