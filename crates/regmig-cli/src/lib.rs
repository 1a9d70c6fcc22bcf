//! # regmig-cli: Registry Migration Command-Line Interface
//!
//! Provides the `regmig` binary.
//!
//! ## Subcommands
//!
//! - `regmig migrate`: Run (or resume) a migration, or export device
//!   batches with `--export-batch-size`.
//! - `regmig status`: Print the progress recorded in a work directory.
//! - `regmig reset`: Delete the checkpoint so the next run starts fresh.
//!
//! ```bash
//! regmig migrate \
//!     --source-service-account old.json --source-registry fleet --source-region us-central1 \
//!     --service-account new.json --registry fleet
//! regmig status --work-dir .
//! ```
//!
//! ## Exit Codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Every phase completed |
//! | 1 | Setup or phase failure |
//! | 2 | Run finished with work left for a resumed run |
//!
//! ## Crate Policy
//!
//! - Argument parsing and credential resolution live here; migration logic
//!   lives in `regmig-engine`.
//! - Handlers return `anyhow::Result<u8>`; `main` maps errors to exit code 1.

pub mod migrate;
pub mod reset;
pub mod status;

/// Every phase completed.
pub const EXIT_OK: u8 = 0;
/// Setup or phase failure.
pub const EXIT_FAILURE: u8 = 1;
/// The run left work for a resumed run.
pub const EXIT_INCOMPLETE: u8 = 2;
