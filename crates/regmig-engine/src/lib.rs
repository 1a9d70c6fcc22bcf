//! # regmig-engine: Resumable, Concurrent Registry Migration
//!
//! Moves devices, their configuration history and their gateway bindings
//! from a source registry to a destination registry. The work is split
//! into checkpointed phases (see [`migrator`]); each phase processes its
//! items concurrently on a [`WorkerPool`] and records every finished item
//! in the [`CheckpointStore`](regmig_state::CheckpointStore) before moving
//! on, so a killed run resumes where it stopped.
//!
//! ## Failure Model
//!
//! - **Setup and phase errors** ([`EngineError`]): unreadable checkpoint,
//!   unusable input file, a listing that cannot be read, destination
//!   cleanup failures. The run stops.
//! - **Item errors**: a single device or gateway failed. Recorded in the
//!   [`ErrorAggregator`], left unmarked in the checkpoint, retried by the
//!   next run. The current run carries on with other items.
//!
//! ## Usage
//!
//! ```no_run
//! # async fn run(
//! #     args: regmig_core::MigrationArgs,
//! #     source: std::sync::Arc<dyn regmig_client::DeviceRegistry>,
//! #     destination: std::sync::Arc<dyn regmig_client::DeviceRegistry>,
//! # ) -> Result<(), regmig_engine::EngineError> {
//! let summary = regmig_engine::Migrator::new(args, source)
//!     .with_destination(destination)
//!     .run()
//!     .await?;
//! println!("{} devices migrated", summary.migrated);
//! # Ok(())
//! # }
//! ```

pub mod cleanup;
pub mod counter;
pub mod csv;
pub mod error;
pub mod export;
pub mod fetch;
pub mod gateway;
pub mod migrator;
pub mod pool;
pub mod report;
pub mod upsert;

pub use cleanup::{cleanup_destination, CleanupStats};
pub use counter::Counter;
pub use csv::{read_device_ids, CsvError};
pub use error::{EngineError, StepError};
pub use export::export_batches;
pub use fetch::{fetch_config_history, fetch_devices, fetch_gateway_bindings, SourceBindings};
pub use gateway::{reconcile_gateway, reconcile_gateways, ReconcileStats};
pub use migrator::{MigrationOutcome, MigrationSummary, Migrator, PhaseStatus};
pub use pool::WorkerPool;
pub use report::{ErrorAggregator, ErrorLogEntry};
pub use upsert::{
    migrate_devices, push_config_history, upsert_device, MigrateStats, UpsertAction,
    UpsertOptions,
};
