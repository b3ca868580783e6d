//! # propsync
//!
//! Demo and benchmark harness for the in-memory synchronization authority.
//!
//! ## Commands
//!
//! - `scenario`: Walk three instances through a shared group and print what
//!   each one observes
//! - `bench`: Measure how pushes to distinct groups overlap when
//!   subscribers are slow
//!
//! ## Example
//!
//! ```bash
//! propsync scenario
//!
//! propsync bench --groups 8 --subscribers 4 --delay-ms 20
//!
//! RUST_LOG=propsync_core=debug propsync --config propsync.toml bench --json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use propsync_core::Config;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{bench, scenario};

/// Demo and benchmark harness for propsync.
#[derive(Parser, Debug)]
#[command(name = "propsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// TOML configuration file for the authority
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the three-instance walk-through
    Scenario,

    /// Push to many groups at once with slow subscribers
    Bench {
        /// Number of distinct groups pushed concurrently
        #[arg(long, default_value = "8")]
        groups: usize,

        /// Subscribers per group
        #[arg(long, default_value = "4")]
        subscribers: usize,

        /// How long each subscriber callback sleeps, in milliseconds
        #[arg(long, default_value = "20")]
        delay_ms: u64,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    tracing::debug!("Using {:?}", config);

    match cli.command {
        Commands::Scenario => {
            scenario::run(&config)?;
        }
        Commands::Bench {
            groups,
            subscribers,
            delay_ms,
            json,
        } => {
            let options = bench::BenchOptions {
                groups,
                subscribers,
                delay_ms,
            };
            bench::run(&config, &options, json)?;
        }
    }

    Ok(())
}
