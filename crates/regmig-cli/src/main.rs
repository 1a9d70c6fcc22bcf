//! # regmig CLI entry point
//!
//! Parses command-line arguments, initialises logging and dispatches to
//! subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use regmig_cli::migrate::{run_migrate, MigrateArgs};
use regmig_cli::reset::{run_reset, ResetArgs};
use regmig_cli::status::{run_status, StatusArgs};
use regmig_cli::EXIT_FAILURE;

/// Registry migration tool.
///
/// Copies devices, their configuration history and gateway bindings from a
/// source registry to a destination registry. Interrupted runs resume from
/// the checkpoint in the work directory.
#[derive(Parser, Debug)]
#[command(name = "regmig", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Migrate devices, or export device batches with --export-batch-size.
    Migrate(MigrateArgs),

    /// Show the progress recorded in a work directory.
    Status(StatusArgs),

    /// Delete the checkpoint so the next run starts fresh.
    Reset(ResetArgs),
}

fn init_tracing(verbose: u8, json: bool) {
    let filter = match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let result = match cli.command {
        Commands::Migrate(args) => run_migrate(&args).await,
        Commands::Status(args) => run_status(&args),
        Commands::Reset(args) => run_reset(&args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
