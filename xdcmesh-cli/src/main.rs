//! xdcmesh CLI - Command-line interface
//!
//! Runs scripted or randomly generated sessions against the update engine.

mod commands;

use std::path::PathBuf;

use clap::Parser;
use xdcmesh_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "xdcmesh")]
#[command(about = "Simulated network for webxdc-style app instances")]
struct Cli {
    /// Console log level
    #[arg(long, value_enum, default_value_t = CliLogLevel::Info)]
    log_level: CliLogLevel,

    /// Directory for the last-run log file
    #[arg(long)]
    logs_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_path = init_tracing(cli.log_level.as_tracing_level(), cli.logs_dir.as_deref())?;
    tracing::debug!(path = %log_path.display(), "Writing trace log");

    commands::handle_command(cli.command).await
}
