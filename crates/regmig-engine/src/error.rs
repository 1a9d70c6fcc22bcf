//! Engine error types.
//!
//! Only setup- and phase-level failures surface as [`EngineError`].
//! Per-device failures are recorded in the
//! [`ErrorAggregator`](crate::report::ErrorAggregator) and never abort a phase.

use std::path::PathBuf;

use regmig_client::RegistryError;
use regmig_core::CoreError;
use regmig_state::CheckpointError;
use thiserror::Error;

use crate::csv::CsvError;

/// Errors that abort a migration run.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The checkpoint could not be loaded or written.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// A registry call whose failure makes the run impossible.
    #[error("{context}: {source}")]
    Registry {
        context: &'static str,
        source: RegistryError,
    },

    /// The device-ID input file is unusable.
    #[error(transparent)]
    Csv(#[from] CsvError),

    /// Writing an output file failed.
    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The run arguments are invalid.
    #[error(transparent)]
    InvalidArgument(#[from] CoreError),

    /// The run needs a destination registry but none was given.
    #[error("no destination registry configured")]
    MissingDestination,

    /// An export was asked to run on top of a migration's checkpoint.
    #[error(
        "{} holds progress of an unfinished migration; resume it, reset it or export from another work dir",
        .path.display()
    )]
    CheckpointInUse { path: PathBuf },
}

/// A failed registry call inside one item's unit of work.
///
/// Never surfaces from a phase: the driver records it in the
/// [`ErrorAggregator`](crate::report::ErrorAggregator) and moves on.
#[derive(Error, Debug)]
#[error("{context}: {source}")]
pub struct StepError {
    pub context: &'static str,
    #[source]
    pub source: RegistryError,
}

impl StepError {
    pub fn new(context: &'static str, source: RegistryError) -> Self {
        Self { context, source }
    }
}
