//! servertide - keeps a cloud server's power state in step with a calendar

mod commands;
mod context;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, error};

use crate::context::AppContext;
use crate::logging::LogFormat;

// ============================================================================
// CLI Types
// ============================================================================

/// Start and stop a Hetzner Cloud server following a recurring calendar
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to a TOML or JSON configuration file
    #[arg(short, long, global = true, env = "SERVERTIDE_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    /// Default log level when RUST_LOG is unset
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the reconciliation loop (default)
    Run,

    /// Show desired and observed state and the pending action
    Status,

    /// Print today's active grid slots
    Grid,

    /// Bring the server up now
    Start {
        /// Server type to use if the server has to be created
        #[arg(long)]
        variant: Option<String>,
    },

    /// Power off, snapshot and delete the server now
    Stop,

    /// Snapshot the current server
    Snapshot,

    /// Gracefully power off the current server
    Shutdown,

    /// Delete old snapshots for the identity
    PruneSnapshots {
        /// Also delete the newest snapshot
        #[arg(long)]
        all: bool,
    },

    /// Assign the identity's floating IP to the current server
    AssignIp,
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();
    logging::init(cli.log_format, &cli.log_level);

    match dotenv {
        Ok(path) => debug!(path = %path.display(), "loaded .env"),
        Err(e) => debug!(error = %e, "no .env loaded"),
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = servertide_infra::config::load(cli.config).context("loading configuration")?;
    let ctx = AppContext::new(config).context("initialising")?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => commands::run(&ctx).await,
        Commands::Status => commands::status(&ctx).await,
        Commands::Grid => commands::grid(&ctx).await,
        Commands::Start { variant } => commands::start(&ctx, variant).await,
        Commands::Stop => commands::stop(&ctx).await,
        Commands::Snapshot => commands::snapshot(&ctx).await,
        Commands::Shutdown => commands::shutdown(&ctx).await,
        Commands::PruneSnapshots { all } => commands::prune_snapshots(&ctx, all).await,
        Commands::AssignIp => commands::assign_ip(&ctx).await,
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_means_run() {
        let cli = Cli::try_parse_from(["servertide"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn parses_subcommand_flags() {
        let cli = Cli::try_parse_from([
            "servertide",
            "--log-format",
            "json",
            "prune-snapshots",
            "--all",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Commands::PruneSnapshots { all: true })));
        assert_eq!(cli.log_format, LogFormat::Json);

        let cli = Cli::try_parse_from(["servertide", "start", "--variant", "cx51"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Start { variant: Some(v) }) if v == "cx51"));
    }
}
