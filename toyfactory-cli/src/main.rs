//! toyfactory - command-line driver for the toy factory cluster.

mod commands;
mod observability;

use anyhow::Result;
use clap::{Parser, Subcommand};
use observability::{LogFormat, TracingConfig, init_tracing};
use std::path::PathBuf;

/// Toy factory - replicated entity state machine behind a request/response gateway.
#[derive(Parser)]
#[command(name = "toyfactory")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an in-process cluster and drive orders through the gateway
    Demo {
        /// Number of concurrent customers, one order each
        #[arg(short, long, default_value = "5")]
        customers: u64,

        /// Directory for snapshot files (recovered on start)
        #[arg(short, long)]
        snapshot_dir: Option<PathBuf>,

        /// Reject status updates that do not move an order forward
        #[arg(long)]
        enforce_progress: bool,
    },

    /// Print the contents of a snapshot file
    InspectSnapshot {
        /// Path to the snapshot file
        file: PathBuf,

        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show version information
    Version,
}

fn setup_logging(verbosity: u8) -> Result<()> {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // Check for explicit log format override, otherwise auto-detect
    let log_format = std::env::var("TOYFACTORY_LOG_FORMAT")
        .ok()
        .and_then(|s| s.parse::<LogFormat>().ok())
        .unwrap_or_else(|| {
            if std::io::IsTerminal::is_terminal(&std::io::stdout()) {
                LogFormat::Pretty
            } else {
                LogFormat::Compact
            }
        });

    // Build config, respecting RUST_LOG if set
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| filter.to_string());

    let include_location = std::env::var("TOYFACTORY_LOG_LOCATION")
        .map(|s| s == "true" || s == "1")
        .unwrap_or(false);

    let config = TracingConfig::builder()
        .log_format(log_format)
        .log_filter(log_filter)
        .include_location(include_location)
        .build();

    init_tracing(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Demo {
            customers,
            snapshot_dir,
            enforce_progress,
        } => commands::demo::run(customers, snapshot_dir, enforce_progress).await,
        Commands::InspectSnapshot { file, json } => commands::inspect::run(&file, json),
        Commands::Version => commands::version::run(),
    }
}
