//! Podscribe - speaker-labeled podcast transcription
//!
//! Accepts podcast audio as asynchronous jobs and produces a WhisperX-style transcript
//! in which every word carries a speaker label.
//!
//! # Overview
//!
//! Each job runs the same pipeline:
//! - Decode the upload to 16 kHz mono samples with ffmpeg
//! - Recognize words with token-level timings
//! - Diarize, falling back to a secondary diarizer when only one speaker is found
//! - Assign every word to a speaker and smooth out short speaker flips
//! - Serialize the segments and record the output location on the job
//!
//! # Architecture
//!
//! - `config` - Configuration management
//! - `audio` - Audio decoding and WAV encoding
//! - `transcription` - Speech recognition, word alignment and output formatting
//! - `diarization` - Primary diarizer and the single-speaker fallback
//! - `pipeline` - Stage sequencing and per-job logging
//! - `jobs` - Job records, stores and the lifecycle manager
//! - `storage` - Upload and transcript files on disk
//!
//! # Example
//!
//! ```rust,no_run
//! use podscribe::config::Settings;
//! use podscribe::jobs::JobManager;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let manager = JobManager::new(&settings)?;
//!
//!     let audio = std::fs::read("episode.mp3")?;
//!     let submission = manager.submit("The Show", "12", &audio).await?;
//!     println!("Submitted job {}", submission.job_id);
//!
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod cli;
pub mod config;
pub mod diarization;
pub mod error;
pub mod jobs;
pub mod openai;
pub mod pipeline;
pub mod storage;
pub mod transcription;

#[cfg(test)]
mod testing;

pub use error::{PodscribeError, Result};
