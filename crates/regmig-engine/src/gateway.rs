//! # Gateway Reconciler
//!
//! Rebuilds gateway bindings in the destination so each gateway is bound to
//! exactly the devices the source binds to it.
//!
//! Per gateway, strictly in order:
//!
//! 1. List the devices the destination currently binds to the gateway and
//!    unbind every one of them.
//! 2. For each device the source binds to the gateway, look it up in the
//!    destination, create it if it is missing, then bind it.
//! 3. Mark the gateway processed, only if every step above succeeded.
//!
//! Starting each gateway from an empty binding set removes stale bindings
//! and makes the whole procedure safe to repeat on resume.

use std::sync::Arc;

use regmig_client::DeviceRegistry;
use regmig_core::{Device, DeviceId, GatewayBindings};
use regmig_state::{CheckpointStore, MigrationPhase};

use crate::counter::Counter;
use crate::error::EngineError;
use crate::pool::WorkerPool;
use crate::report::ErrorAggregator;

/// Reconcile one gateway. Returns `true` when every step succeeded.
pub async fn reconcile_gateway(
    destination: &dyn DeviceRegistry,
    gateway_id: &DeviceId,
    source_bound: &[Device],
    update_public_keys: bool,
    errors: &ErrorAggregator,
) -> bool {
    let mut clean = true;

    let current = match destination.list_bound_devices(gateway_id).await {
        Ok(devices) => devices,
        Err(e) if e.is_not_found() => Vec::new(),
        Err(e) => {
            errors.add("List destination bindings", gateway_id, e);
            clean = false;
            Vec::new()
        }
    };
    for device in &current {
        if let Err(e) = destination
            .unbind_device_from_gateway(&device.id, gateway_id)
            .await
        {
            errors.add("Unbind device", &device.id, e);
            clean = false;
        }
    }
    tracing::debug!(gateway_id = %gateway_id, unbound = current.len(), "cleared destination bindings");

    for device in source_bound {
        match destination.get_device(&device.id).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                let target = device.for_destination(update_public_keys);
                match destination.create_device(&target).await {
                    Ok(_) => {
                        tracing::debug!(device_id = %device.id, "created bound device");
                    }
                    Err(e) if e.is_conflict() => {}
                    Err(e) => {
                        errors.add("Create bound device", &device.id, e);
                        clean = false;
                        continue;
                    }
                }
            }
            Err(e) => {
                errors.add("Get bound device", &device.id, e);
                clean = false;
                continue;
            }
        }

        if let Err(e) = destination
            .bind_device_to_gateway(&device.id, gateway_id)
            .await
        {
            errors.add("Bind device", &device.id, e);
            clean = false;
        }
    }
    clean
}

/// Totals of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub processed: usize,
    pub failed: usize,
}

/// Reconcile every gateway of `bindings` not yet processed.
pub async fn reconcile_gateways(
    destination: &Arc<dyn DeviceRegistry>,
    checkpoint: &Arc<CheckpointStore>,
    errors: &Arc<ErrorAggregator>,
    bindings: &GatewayBindings,
    update_public_keys: bool,
    workers: usize,
) -> Result<ReconcileStats, EngineError> {
    if checkpoint.is_phase_completed(MigrationPhase::GatewayBinding) {
        return Ok(ReconcileStats::default());
    }

    let pending = checkpoint.unprocessed_gateways(bindings);
    if pending.is_empty() {
        return Ok(ReconcileStats::default());
    }
    tracing::info!(
        gateways = bindings.len(),
        pending = pending.len(),
        "reconciling gateway bindings"
    );

    let processed = Arc::new(Counter::new());
    let failed = Arc::new(Counter::new());
    let pool = WorkerPool::new(workers)?;
    for gateway_id in pending {
        let bound = bindings.get(&gateway_id).cloned().unwrap_or_default();
        let destination = Arc::clone(destination);
        let checkpoint = Arc::clone(checkpoint);
        let errors = Arc::clone(errors);
        let processed = Arc::clone(&processed);
        let failed = Arc::clone(&failed);
        pool.add_task(async move {
            let clean = reconcile_gateway(
                destination.as_ref(),
                &gateway_id,
                &bound,
                update_public_keys,
                &errors,
            )
            .await;
            if !clean {
                failed.increment();
                return;
            }
            match checkpoint.add_processed_gateway(&gateway_id) {
                Ok(()) => {
                    tracing::info!(gateway_id = %gateway_id, bound = bound.len(), "gateway reconciled");
                    processed.increment();
                }
                Err(e) => {
                    errors.add("Save checkpoint", &gateway_id, e);
                    failed.increment();
                }
            }
        })
        .await;
    }
    pool.close().await;

    Ok(ReconcileStats {
        processed: processed.count(),
        failed: failed.count(),
    })
}
