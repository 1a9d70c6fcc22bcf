//! # regmig-state: Resumable Migration State
//!
//! A migration runs through a fixed, linearly ordered set of phases:
//!
//! ```text
//! device_fetch → device_migrate → config_history → gateway_binding → complete
//! ```
//!
//! Progress inside each phase is recorded item by item in a single JSON
//! checkpoint file. A run that is killed and restarted loads that file,
//! skips every phase already marked complete, and within the current phase
//! only processes items the checkpoint has not recorded.
//!
//! ## Durability
//!
//! Every mutating call on [`CheckpointStore`] takes the write lock, applies
//! the change, and rewrites the whole file (temporary sibling + rename)
//! before releasing the lock. There is no background flush.
//!
//! ## Trust
//!
//! A missing checkpoint means a fresh run. A checkpoint that exists but
//! cannot be read or parsed is a fatal error: nothing of it is trusted.

pub mod checkpoint;
pub mod error;
pub mod phase;

pub use checkpoint::{CheckpointProgress, CheckpointState, CheckpointStore, CHECKPOINT_FILE};
pub use error::CheckpointError;
pub use phase::MigrationPhase;
