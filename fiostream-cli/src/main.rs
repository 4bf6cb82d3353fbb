// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! fiostream CLI
//!
//! Command-line interface streaming fio benchmark telemetry into InfluxDB.

use clap::{Args, Parser, Subcommand};
use fiostream_core::RecordFormat;

mod commands;
mod metrics;
mod progress;

/// fiostream - live fio benchmark telemetry for InfluxDB
#[derive(Parser)]
#[command(name = "fiostream")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (defaults to ./fiostream.yaml when present)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// InfluxDB API token (overrides sink.token)
    #[arg(long, global = true, env = "FIOSTREAM_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by the streaming commands.
#[derive(Args, Debug, Clone, Default)]
pub struct StreamArgs {
    /// Keep metrics in memory instead of writing to InfluxDB
    #[arg(long)]
    pub dry_run: bool,

    /// Also write timestamp, read speed and latency to this CSV file
    #[arg(long)]
    pub csv: Option<String>,

    /// Expose pipeline counters for Prometheus on this port
    #[arg(long)]
    pub metrics_port: Option<u16>,

    /// Host tag for records that do not name their host
    #[arg(long)]
    pub host_tag: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run fio and stream its status reports
    Run {
        /// fio job file (overrides benchmark.job_file)
        job_file: Option<String>,

        /// Output format to request from fio (json or terse)
        #[arg(short, long)]
        format: Option<RecordFormat>,

        #[command(flatten)]
        stream: StreamArgs,
    },

    /// Stream fio output from stdin
    Ingest {
        /// Format of the incoming stream (json or terse)
        #[arg(short, long)]
        format: Option<RecordFormat>,

        #[command(flatten)]
        stream: StreamArgs,
    },

    /// Create the configured bucket if it does not exist
    Provision,

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file (defaults to --config)
        file: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();

    let overrides = commands::Overrides {
        config: cli.config.clone(),
        token: cli.token.clone(),
    };

    // Dispatch to command handlers
    match cli.command {
        Commands::Run {
            job_file,
            format,
            stream,
        } => commands::run::execute(&overrides, job_file, format, &stream).await,
        Commands::Ingest { format, stream } => {
            commands::ingest::execute(&overrides, format, &stream).await
        }
        Commands::Provision => commands::provision::execute(&overrides).await,
        Commands::Validate { file } => {
            commands::validate::execute(file.or(cli.config).as_deref()).await
        }
    }
}
