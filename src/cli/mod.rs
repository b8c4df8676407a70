//! CLI module for Podscribe.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Podscribe - speaker-labeled podcast transcription
///
/// Turns uploaded audio into a WhisperX-style transcript where every word is attributed
/// to a speaker. Runs as an HTTP job service or as a one-shot local command.
#[derive(Parser, Debug)]
#[command(name = "podscribe")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "PODSCRIBE_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP job service
    Serve {
        /// Host to bind to (defaults to server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (defaults to server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Transcribe a local audio file and wait for the result
    Transcribe {
        /// Audio file (any format ffmpeg can decode)
        file: PathBuf,

        /// Podcast name
        #[arg(long)]
        podcast: String,

        /// Episode identifier
        #[arg(long)]
        episode: String,

        /// Write the transcript here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List recent jobs
    Jobs {
        /// Maximum number of jobs to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show a job and its log
    Status {
        /// Job id
        job_id: String,
    },

    /// Delete jobs stuck in RUNNING
    Cleanup,

    /// Check system requirements and configuration
    Doctor,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write the default configuration to the config file path
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_transcribe() {
        let cli = Cli::parse_from([
            "podscribe",
            "-vv",
            "transcribe",
            "episode.mp3",
            "--podcast",
            "The Show",
            "--episode",
            "12",
            "-o",
            "out.json",
        ]);

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Transcribe {
                file,
                podcast,
                episode,
                output,
            } => {
                assert_eq!(file, PathBuf::from("episode.mp3"));
                assert_eq!(podcast, "The Show");
                assert_eq!(episode, "12");
                assert_eq!(output, Some(PathBuf::from("out.json")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_config_init() {
        let cli = Cli::parse_from(["podscribe", "config", "init", "--force"]);
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Init { force: true }
            }
        ));
    }

    #[test]
    fn test_jobs_default_limit() {
        let cli = Cli::parse_from(["podscribe", "jobs"]);
        assert!(matches!(cli.command, Commands::Jobs { limit: 20 }));
    }
}
