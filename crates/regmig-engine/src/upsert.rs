//! # Upsert Engine
//!
//! Create-or-update of each device in the destination registry.
//!
//! ## Protocol
//!
//! 1. Create the destination copy ([`Device::for_destination`]).
//! 2. Created: done.
//! 3. `Conflict`: the device already exists, so patch it with
//!    [`UpdateMask::for_existing_device`] and, unless configuration pushes
//!    are skipped, push the latest configuration.
//! 4. Any other failure: recorded, the device stays unmigrated and is
//!    retried by a resumed run.
//!
//! "Already exists" is a reconciliation branch, not an error, so running
//! the upsert again against a partially migrated destination never creates
//! a duplicate and converges on the source state.

use std::sync::Arc;

use regmig_client::DeviceRegistry;
use regmig_core::{Device, MigrationArgs, UpdateMask};
use regmig_state::{CheckpointStore, MigrationPhase};

use crate::counter::Counter;
use crate::error::{EngineError, StepError};
use crate::migrator::PhaseStatus;
use crate::pool::WorkerPool;
use crate::report::ErrorAggregator;

/// What an upsert did to the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    Created,
    Updated,
}

/// Options governing how existing destination devices are updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOptions {
    pub update_public_keys: bool,
    pub skip_config: bool,
}

impl From<&MigrationArgs> for UpsertOptions {
    fn from(args: &MigrationArgs) -> Self {
        Self {
            update_public_keys: args.update_public_keys,
            skip_config: args.skip_config,
        }
    }
}

/// Create `device` in `destination`, or bring the existing record in line.
pub async fn upsert_device(
    destination: &dyn DeviceRegistry,
    device: &Device,
    options: UpsertOptions,
) -> Result<UpsertAction, StepError> {
    let target = device.for_destination(options.update_public_keys);
    match destination.create_device(&target).await {
        Ok(_) => {
            tracing::debug!(device_id = %device.id, "created device");
            Ok(UpsertAction::Created)
        }
        Err(e) if e.is_conflict() => {
            let mask = UpdateMask::for_existing_device(options.update_public_keys);
            destination
                .patch_device(&device.id, &target, &mask)
                .await
                .map_err(|e| StepError::new("Update device", e))?;

            if !options.skip_config {
                if let Some(data) = device.latest_config_data() {
                    destination
                        .modify_config(&device.id, data)
                        .await
                        .map_err(|e| StepError::new("Update device config", e))?;
                }
            }
            tracing::debug!(device_id = %device.id, %mask, "updated existing device");
            Ok(UpsertAction::Updated)
        }
        Err(e) => Err(StepError::new("Create device", e)),
    }
}

/// Totals of one migrate pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrateStats {
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Upsert every device of `devices` not yet migrated.
///
/// Each success is recorded in the checkpoint before the task ends. The
/// phase is reported complete only when nothing failed; the caller owns
/// the phase transition.
pub async fn migrate_devices(
    destination: &Arc<dyn DeviceRegistry>,
    checkpoint: &Arc<CheckpointStore>,
    errors: &Arc<ErrorAggregator>,
    devices: &[Device],
    args: &MigrationArgs,
) -> Result<(MigrateStats, PhaseStatus), EngineError> {
    if checkpoint.is_phase_completed(MigrationPhase::DeviceMigrate) {
        tracing::info!("device migration already complete");
        return Ok((MigrateStats::default(), PhaseStatus::Complete));
    }

    let remaining = checkpoint.remaining_devices_for_migration(devices);
    tracing::info!(
        total = devices.len(),
        remaining = remaining.len(),
        "migrating devices"
    );

    let options = UpsertOptions::from(args);
    let created = Arc::new(Counter::new());
    let updated = Arc::new(Counter::new());
    let failed = Arc::new(Counter::new());
    let pool = WorkerPool::new(args.workers)?;

    for device in remaining {
        let destination = Arc::clone(destination);
        let checkpoint = Arc::clone(checkpoint);
        let errors = Arc::clone(errors);
        let created = Arc::clone(&created);
        let updated = Arc::clone(&updated);
        let failed = Arc::clone(&failed);
        pool.add_task(async move {
            let action = match upsert_device(destination.as_ref(), &device, options).await {
                Ok(action) => action,
                Err(e) => {
                    errors.add(e.context, &device.id, &e.source);
                    failed.increment();
                    return;
                }
            };
            if let Err(e) = checkpoint.add_migrated_device(&device.id) {
                errors.add("Save checkpoint", &device.id, e);
                failed.increment();
                return;
            }
            match action {
                UpsertAction::Created => created.increment(),
                UpsertAction::Updated => updated.increment(),
            }
        })
        .await;
    }
    pool.close().await;

    let stats = MigrateStats {
        created: created.count(),
        updated: updated.count(),
        failed: failed.count(),
    };
    tracing::info!(
        created = stats.created,
        updated = stats.updated,
        failed = stats.failed,
        migrated = checkpoint.migrated_count(),
        "device migration pass finished"
    );
    let status = if stats.failed == 0 {
        PhaseStatus::Complete
    } else {
        PhaseStatus::Incomplete
    };
    Ok((stats, status))
}

/// Push the captured configuration history to `destination` in one call.
///
/// Failure is recorded and otherwise ignored. Returns whether the push
/// happened and succeeded.
pub async fn push_config_history(
    destination: &dyn DeviceRegistry,
    checkpoint: &CheckpointStore,
    errors: &ErrorAggregator,
) -> bool {
    let history = checkpoint.config_history();
    if history.is_empty() {
        return false;
    }
    match destination.update_config_history(&history).await {
        Ok(()) => {
            tracing::info!(devices = history.len(), "pushed config history");
            true
        }
        Err(e) => {
            errors.add_general("Update config history", e);
            false
        }
    }
}
