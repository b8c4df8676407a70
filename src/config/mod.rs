//! Configuration module for Podscribe.
//!
//! Handles loading and managing application settings.

mod settings;

pub use settings::{
    AsrSettings, AudioSettings, DiarizationSettings, FallbackSettings, GeneralSettings,
    PipelineSettings, ServerSettings, Settings, StorageSettings,
};
