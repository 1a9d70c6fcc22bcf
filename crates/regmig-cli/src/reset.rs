//! Reset subcommand: delete the checkpoint so the next run starts fresh.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use regmig_state::CheckpointStore;

use crate::EXIT_OK;

/// Arguments for the reset subcommand.
#[derive(Args, Debug, Clone)]
pub struct ResetArgs {
    /// Directory holding the checkpoint.
    #[arg(long, default_value = ".")]
    pub work_dir: PathBuf,
}

/// Run the reset subcommand.
pub fn run_reset(args: &ResetArgs) -> anyhow::Result<u8> {
    let removed = CheckpointStore::remove(&args.work_dir)
        .with_context(|| format!("removing checkpoint in {}", args.work_dir.display()))?;
    if removed {
        tracing::info!(work_dir = %args.work_dir.display(), "checkpoint removed");
        println!("Checkpoint removed. The next run starts a fresh migration.");
    } else {
        println!("No checkpoint in {}.", args.work_dir.display());
    }
    Ok(EXIT_OK)
}
