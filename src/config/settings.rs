//! Configuration settings for Podscribe.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub audio: AudioSettings,
    pub asr: AsrSettings,
    pub diarization: DiarizationSettings,
    pub fallback: FallbackSettings,
    pub pipeline: PipelineSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.podscribe".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
    /// Maximum accepted upload size in megabytes.
    pub max_upload_mb: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5051,
            max_upload_mb: 500,
        }
    }
}

/// Job database and working file locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Path to the SQLite job database.
    pub database_path: String,
    /// Directory for uploaded audio and transcript artifacts.
    pub work_dir: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_path: "~/.podscribe/jobs.db".to_string(),
            work_dir: "/tmp/podscribe".to_string(),
        }
    }
}

/// Audio decoding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// ffmpeg binary used for decoding and resampling to 16 kHz mono.
    pub ffmpeg: String,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
        }
    }
}

/// Speech recognition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AsrSettings {
    /// Whisper model used for word-level timestamps.
    pub model: String,
    /// Optional language hint (ISO 639-1).
    pub language: Option<String>,
    /// Length of each audio window sent to the API, in seconds.
    pub chunk_seconds: u32,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for AsrSettings {
    fn default() -> Self {
        Self {
            model: "whisper-1".to_string(),
            language: None,
            chunk_seconds: 300,
            timeout_seconds: 300,
        }
    }
}

/// External diarization program settings.
///
/// The program receives its arguments followed by the path of a 16 kHz mono WAV file
/// and prints a JSON object with a `segments` array on stdout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiarizationSettings {
    /// Program to run.
    pub command: String,
    /// Arguments placed before the WAV path.
    pub args: Vec<String>,
    /// Optional program run once before first use (model download, warm-up).
    pub prepare_command: Option<Vec<String>>,
}

impl Default for DiarizationSettings {
    fn default() -> Self {
        Self {
            command: "podscribe-diarize".to_string(),
            args: vec!["--min-speakers".to_string(), "2".to_string()],
            prepare_command: None,
        }
    }
}

/// Fallback diarizer settings, used when the primary diarizer finds a single speaker.
///
/// Same program contract as [`DiarizationSettings`], except that segments carry a
/// numeric `speaker_index` instead of a label.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackSettings {
    /// Program to run.
    pub command: String,
    /// Arguments placed before the WAV path.
    pub args: Vec<String>,
    /// Optional program run once before first use (model download).
    pub prepare_command: Option<Vec<String>>,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            command: "podscribe-sortformer".to_string(),
            args: Vec::new(),
            prepare_command: None,
        }
    }
}

/// Pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Minimum duration (seconds) a speaker run must reach before a speaker change splits it.
    pub min_segment_seconds: f64,
    /// Serialize model inference across concurrent jobs.
    pub serialize_inference: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            min_segment_seconds: 2.0,
            serialize_inference: true,
        }
    }
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_toml(&content)
        } else {
            Ok(Settings::default())
        }
    }

    /// Parse settings from TOML text. Missing sections keep their defaults.
    pub fn from_toml(content: &str) -> crate::error::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::PodscribeError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("podscribe")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded working directory for job artifacts.
    pub fn work_dir(&self) -> PathBuf {
        Self::expand_path(&self.storage.work_dir)
    }

    /// Get the expanded SQLite database path.
    pub fn database_path(&self) -> PathBuf {
        Self::expand_path(&self.storage.database_path)
    }

    /// Maximum upload size in bytes.
    pub fn max_upload_bytes(&self) -> usize {
        self.server.max_upload_mb * 1024 * 1024
    }
}
