//! # Destination Cleanup
//!
//! Empties the destination registry before a migration: every gateway is
//! unbound from its devices and deleted, then every remaining device is
//! deleted. Unlike the migration phases, any failure here aborts the run.

use std::sync::Arc;

use parking_lot::Mutex;
use regmig_client::{DeviceListFilter, DeviceRegistry, RegistryError};
use regmig_core::DeviceId;

use crate::counter::Counter;
use crate::error::{EngineError, StepError};
use crate::pool::WorkerPool;

/// What a cleanup removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub gateways_deleted: usize,
    pub devices_deleted: usize,
}

/// First failure reported by any worker.
type FirstError = Arc<Mutex<Option<StepError>>>;

fn keep_first(slot: &FirstError, err: StepError) {
    let mut slot = slot.lock();
    if slot.is_none() {
        *slot = Some(err);
    }
}

fn into_engine_error(err: StepError) -> EngineError {
    EngineError::Registry {
        context: err.context,
        source: err.source,
    }
}

async fn unbind_and_delete_gateway(
    destination: &dyn DeviceRegistry,
    gateway_id: &DeviceId,
) -> Result<(), StepError> {
    let bound = destination
        .list_bound_devices(gateway_id)
        .await
        .map_err(|e| StepError::new("List destination bindings", e))?;
    for device in &bound {
        destination
            .unbind_device_from_gateway(&device.id, gateway_id)
            .await
            .map_err(|e| StepError::new("Unbind device", e))?;
    }
    delete_if_present(destination, gateway_id)
        .await
        .map_err(|e| StepError::new("Delete gateway", e))
}

async fn delete_if_present(
    destination: &dyn DeviceRegistry,
    id: &DeviceId,
) -> Result<(), RegistryError> {
    match destination.delete_device(id).await {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

/// Delete every gateway, then every device, in `destination`.
pub async fn cleanup_destination(
    destination: &Arc<dyn DeviceRegistry>,
    workers: usize,
) -> Result<CleanupStats, EngineError> {
    let gateways = destination
        .list_all_devices(&DeviceListFilter::gateways())
        .await
        .map_err(|source| EngineError::Registry {
            context: "List destination gateways",
            source,
        })?;
    tracing::info!(gateways = gateways.len(), "cleaning up destination gateways");

    let first_error: FirstError = Arc::new(Mutex::new(None));
    let deleted = Arc::new(Counter::new());
    let pool = WorkerPool::new(workers)?;
    for gateway in gateways {
        let destination = Arc::clone(destination);
        let first_error = Arc::clone(&first_error);
        let deleted = Arc::clone(&deleted);
        pool.add_task(async move {
            match unbind_and_delete_gateway(destination.as_ref(), &gateway.id).await {
                Ok(()) => deleted.increment(),
                Err(e) => keep_first(&first_error, e),
            }
        })
        .await;
    }
    pool.close().await;
    if let Some(err) = first_error.lock().take() {
        return Err(into_engine_error(err));
    }
    let gateways_deleted = deleted.count();

    let devices = destination
        .list_all_devices(&DeviceListFilter::default())
        .await
        .map_err(|source| EngineError::Registry {
            context: "List destination devices",
            source,
        })?;
    tracing::info!(devices = devices.len(), "cleaning up destination devices");

    deleted.set(0);
    let pool = WorkerPool::new(workers)?;
    for device in devices {
        let destination = Arc::clone(destination);
        let first_error = Arc::clone(&first_error);
        let deleted = Arc::clone(&deleted);
        pool.add_task(async move {
            match delete_if_present(destination.as_ref(), &device.id).await {
                Ok(()) => deleted.increment(),
                Err(e) => keep_first(&first_error, StepError::new("Delete device", e)),
            }
        })
        .await;
    }
    pool.close().await;
    if let Some(err) = first_error.lock().take() {
        return Err(into_engine_error(err));
    }

    let stats = CleanupStats {
        gateways_deleted,
        devices_deleted: deleted.count(),
    };
    tracing::info!(
        gateways = stats.gateways_deleted,
        devices = stats.devices_deleted,
        "destination cleanup finished"
    );
    Ok(stats)
}
