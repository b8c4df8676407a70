//! CLI command implementations.

mod config;
mod doctor;
mod jobs;
mod serve;
mod transcribe;

pub use config::run_config;
pub use doctor::run_doctor;
pub use jobs::{run_cleanup, run_jobs, run_status};
pub use serve::run_serve;
pub use transcribe::run_transcribe;
