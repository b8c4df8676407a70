//! Podscribe CLI entry point.

use anyhow::Result;
use clap::Parser;
use podscribe::cli::{commands, Cli, Commands};
use podscribe::config::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let settings = Settings::load_from(cli.config.as_ref().map(std::path::PathBuf::from).as_ref())?;

    // Initialize logging
    let log_level = match cli.verbose {
        0 => settings.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("podscribe={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Ensure data directories exist
    std::fs::create_dir_all(settings.data_dir())?;
    std::fs::create_dir_all(settings.work_dir())?;

    match &cli.command {
        Commands::Serve { host, port } => {
            commands::run_serve(host.as_deref(), *port, settings).await?;
        }

        Commands::Transcribe {
            file,
            podcast,
            episode,
            output,
        } => {
            commands::run_transcribe(file, podcast, episode, output.clone(), settings).await?;
        }

        Commands::Jobs { limit } => {
            commands::run_jobs(*limit, settings).await?;
        }

        Commands::Status { job_id } => {
            commands::run_status(job_id, settings).await?;
        }

        Commands::Cleanup => {
            commands::run_cleanup(settings).await?;
        }

        Commands::Doctor => {
            commands::run_doctor(&settings, cli.config.as_deref()).await?;
        }

        Commands::Config { action } => {
            commands::run_config(action, cli.config.as_deref(), &settings)?;
        }
    }

    Ok(())
}
