//! # Status Subcommand
//!
//! Prints the progress recorded in a work directory's checkpoint without
//! contacting any registry.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use regmig_state::{CheckpointState, CheckpointStore};

use crate::EXIT_OK;

/// Arguments for the status subcommand.
#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    /// Directory holding the checkpoint.
    #[arg(long, default_value = ".")]
    pub work_dir: PathBuf,
}

/// Human-readable report of a checkpoint.
pub fn render_status(state: &CheckpointState) -> String {
    let progress = state.progress();
    let completed: Vec<&str> = progress
        .completed_phases
        .iter()
        .map(|p| p.as_str())
        .collect();
    let mut out = String::new();
    out.push_str(&format!("Current phase:      {}\n", progress.current_phase));
    out.push_str(&format!(
        "Completed phases:   {}\n",
        if completed.is_empty() {
            "none".to_string()
        } else {
            completed.join(", ")
        }
    ));
    out.push_str(&format!("Started:            {}\n", progress.start_time.to_rfc3339()));
    out.push_str(&format!("Last updated:       {}\n", progress.last_updated.to_rfc3339()));
    out.push_str(&format!("Total devices:      {}\n", progress.total_devices));
    out.push_str(&format!("Fetched:            {}\n", progress.fetched));
    out.push_str(&format!("Migrated:           {}\n", progress.migrated));
    out.push_str(&format!("Configs processed:  {}\n", progress.configs_processed));
    out.push_str(&format!("Gateways processed: {}\n", progress.gateways_processed));
    if let Some(args) = &state.args {
        out.push_str(&format!("Source registry:    {}\n", args.source.registry_path()));
        if let Some(dest) = &args.destination {
            out.push_str(&format!("Destination:        {}\n", dest.registry_path()));
        }
    }
    out
}

/// Run the status subcommand.
pub fn run_status(args: &StatusArgs) -> anyhow::Result<u8> {
    let state = CheckpointStore::load(&args.work_dir)
        .with_context(|| format!("reading checkpoint in {}", args.work_dir.display()))?;
    match state {
        Some(state) => print!("{}", render_status(&state)),
        None => println!(
            "No migration in progress in {} (no {}).",
            args.work_dir.display(),
            regmig_state::CHECKPOINT_FILE
        ),
    }
    Ok(EXIT_OK)
}
