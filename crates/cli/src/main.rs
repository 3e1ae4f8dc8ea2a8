//! Hostwatch CLI
//!
//! A command-line tool for training the host anomaly detector, scoring
//! stored samples and inspecting the persisted model.

mod commands;
mod output;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use commands::{model, sample, score, train};
use hostwatch_lib::HostwatchConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Hostwatch CLI
#[derive(Parser)]
#[command(name = "hostwatch")]
#[command(author, version, about = "Host metrics anomaly detection", long_about = None)]
pub struct Cli {
    /// Configuration file (can also be set via HOSTWATCH_CONFIG env var)
    #[arg(long, env = "HOSTWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite database file (overrides configuration)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Sample table name (overrides configuration)
    #[arg(long)]
    pub table: Option<String>,

    /// Model bundle file (overrides configuration)
    #[arg(long)]
    pub bundle: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train the detector on all stored samples and replace the model bundle
    Train,

    /// Label stored samples as normal or anomalous
    Score {
        #[command(flatten)]
        range: RangeArgs,

        /// Show only anomalous samples
        #[arg(long)]
        anomalies_only: bool,
    },

    /// Show totals, anomaly rate and the latest reading
    Summary {
        #[command(flatten)]
        range: RangeArgs,
    },

    /// Inspect the persisted model bundle
    Model,

    /// Collect and store a single host sample
    Sample {
        /// Mount point whose disk usage is sampled (overrides configuration)
        #[arg(long)]
        disk_path: Option<PathBuf>,
    },
}

/// Inclusive calendar-day range in the host's local time zone
#[derive(clap::Args, Debug, Clone, Default)]
pub struct RangeArgs {
    /// First day to include (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Last day to include (YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<NaiveDate>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Train => train::run(&config, cli.format)?,
        Commands::Score {
            range,
            anomalies_only,
        } => score::score(&config, &range, anomalies_only, cli.format)?,
        Commands::Summary { range } => score::summary(&config, &range, cli.format)?,
        Commands::Model => model::show(&config, cli.format)?,
        Commands::Sample { disk_path } => sample::run(&config, disk_path, cli.format).await?,
    }

    Ok(())
}

/// Load configuration and apply command-line overrides
fn load_config(cli: &Cli) -> Result<HostwatchConfig> {
    let mut config =
        HostwatchConfig::load_from(cli.config.as_deref()).context("Failed to load configuration")?;

    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }
    if let Some(table) = &cli.table {
        config.table_name = table.clone();
    }
    if let Some(bundle) = &cli.bundle {
        config.bundle_path = bundle.clone();
    }
    config.validate()?;

    Ok(config)
}
