//! Checkpoint error types.

use std::path::PathBuf;

use regmig_core::DeviceId;
use thiserror::Error;

use crate::phase::MigrationPhase;

/// Errors from the checkpoint store.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Reading, writing, renaming or deleting the checkpoint file failed.
    #[error("checkpoint I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The checkpoint file exists but is not a valid checkpoint.
    #[error("checkpoint {} is corrupt: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// The in-memory state could not be serialized.
    #[error("failed to serialize checkpoint: {0}")]
    Serialize(#[source] serde_json::Error),

    /// A phase change that would move the run backwards.
    #[error("invalid phase transition from {from} to {to}")]
    InvalidTransition {
        from: MigrationPhase,
        to: MigrationPhase,
    },

    /// A device was recorded as migrated without having been fetched.
    #[error("device {id} was never fetched")]
    UnknownDevice { id: DeviceId },
}
