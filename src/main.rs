use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

use startlist::TrackerConfig;

mod commands;

#[derive(Parser)]
#[command(name = "startlist")]
#[command(about = "Airfield start list: detects starts and landings and classifies launches")]
#[command(version)]
struct Cli {
    /// TOML configuration file. Without it the configuration is read from the
    /// environment (AF_LAT, AF_LNG, AF_ELEVATION and STARTLIST_* overrides)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay position reports from a JSON-lines file and print the resulting flights
    Replay {
        /// File with one JSON position report per line
        file: PathBuf,

        /// Previously downloaded OGN device database (JSON) used to fill in callsigns
        #[arg(long, conflicts_with = "fetch_ddb")]
        ddb: Option<PathBuf>,

        /// Download the OGN device database before replaying
        #[arg(long)]
        fetch_ddb: bool,

        /// Number of report processing workers
        #[arg(long, default_value = "4")]
        workers: usize,

        /// Expose Prometheus metrics on this port
        #[arg(long)]
        metrics_port: Option<u16>,
    },
    /// Print the effective configuration as TOML
    ShowConfig,
}

fn load_config(path: Option<&PathBuf>) -> Result<TrackerConfig> {
    match path {
        Some(path) => TrackerConfig::load(path),
        None => TrackerConfig::from_env().context(
            "Failed to load configuration from environment (set AF_LAT, AF_LNG, AF_ELEVATION or pass --config)",
        ),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Logs go to stderr so stdout stays machine readable
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Replay {
            file,
            ddb,
            fetch_ddb,
            workers,
            metrics_port,
        } => {
            info!(
                "Airfield at {:.5}, {:.5} ({} m)",
                config.home_latitude, config.home_longitude, config.home_elevation_m
            );
            commands::handle_replay(
                config,
                commands::ReplayOptions {
                    file,
                    ddb,
                    fetch_ddb,
                    workers,
                    metrics_port,
                },
            )
            .await
        }
        Commands::ShowConfig => commands::handle_show_config(&config),
    }
}
