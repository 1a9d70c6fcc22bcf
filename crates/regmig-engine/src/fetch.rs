//! # Fetch Pipeline
//!
//! Reads everything the later phases need from the source registry:
//!
//! - [`fetch_devices`]: the device set, from an explicit ID list fetched
//!   concurrently or from a paginated listing. Recorded into the checkpoint
//!   as it arrives.
//! - [`fetch_config_history`]: per-device configuration versions for devices
//!   whose history is not yet captured.
//! - [`fetch_gateway_bindings`]: for each unprocessed gateway, the devices
//!   the source binds to it.
//!
//! Item-level failures go to the [`ErrorAggregator`]; only failures that
//! make the phase impossible (the listing itself, the checkpoint file)
//! surface as [`EngineError`].

use std::sync::Arc;

use parking_lot::Mutex;
use regmig_client::{DeviceListFilter, DeviceRegistry};
use regmig_core::{Device, DeviceId, GatewayBindings, MigrationArgs};
use regmig_state::{CheckpointStore, MigrationPhase};

use crate::counter::Counter;
use crate::csv::read_device_ids;
use crate::error::EngineError;
use crate::migrator::PhaseStatus;
use crate::pool::WorkerPool;
use crate::report::ErrorAggregator;

// ─── Devices ────────────────────────────────────────────────────────

/// Populate the checkpoint with the source devices this run migrates.
///
/// Returns every fetched device, ordered by ID. On a complete fetch the
/// checkpoint advances to [`MigrationPhase::DeviceMigrate`]. IDs the source
/// reports as missing do not hold the phase back; any other failure does.
pub async fn fetch_devices(
    source: &Arc<dyn DeviceRegistry>,
    checkpoint: &Arc<CheckpointStore>,
    errors: &Arc<ErrorAggregator>,
    args: &MigrationArgs,
) -> Result<(Vec<Device>, PhaseStatus), EngineError> {
    if checkpoint.is_phase_completed(MigrationPhase::DeviceFetch) {
        let devices = checkpoint.fetched_devices();
        tracing::info!(devices = devices.len(), "device fetch already complete, using checkpoint");
        return Ok((devices, PhaseStatus::Complete));
    }

    let failed = match &args.devices_csv {
        Some(path) => {
            let ids = read_device_ids(path)?;
            tracing::info!(path = %path.display(), ids = ids.len(), "fetching devices listed in CSV");
            fetch_by_id(source, checkpoint, errors, &ids, args.workers).await?
        }
        None => {
            list_into_checkpoint(source, checkpoint).await?;
            0
        }
    };

    let devices = checkpoint.fetched_devices();
    if failed > 0 {
        tracing::warn!(failed, fetched = devices.len(), "device fetch incomplete");
        return Ok((devices, PhaseStatus::Incomplete));
    }

    tracing::info!(fetched = devices.len(), "device fetch complete");
    checkpoint.set_phase(MigrationPhase::DeviceMigrate)?;
    Ok((devices, PhaseStatus::Complete))
}

/// Fetch each of `ids` not yet in the checkpoint. Returns the number of
/// IDs that failed for a reason other than not existing.
async fn fetch_by_id(
    source: &Arc<dyn DeviceRegistry>,
    checkpoint: &Arc<CheckpointStore>,
    errors: &Arc<ErrorAggregator>,
    ids: &[DeviceId],
    workers: usize,
) -> Result<usize, EngineError> {
    checkpoint.set_total_devices(ids.len())?;
    let remaining = checkpoint.unfetched_device_ids(ids);
    if remaining.len() < ids.len() {
        tracing::info!(
            skipped = ids.len() - remaining.len(),
            remaining = remaining.len(),
            "resuming device fetch"
        );
    }

    let missing = Arc::new(Mutex::new(Vec::new()));
    let failed = Arc::new(Counter::new());
    let pool = WorkerPool::new(workers)?;

    for id in remaining {
        let source = Arc::clone(source);
        let checkpoint = Arc::clone(checkpoint);
        let errors = Arc::clone(errors);
        let missing = Arc::clone(&missing);
        let failed = Arc::clone(&failed);
        pool.add_task(async move {
            match source.get_device(&id).await {
                Ok(device) => {
                    if let Err(e) = checkpoint.add_fetched_device(device) {
                        errors.add("Save checkpoint", &id, e);
                        failed.increment();
                    }
                }
                Err(e) if e.is_not_found() => {
                    errors.add("Fetch device", &id, "device not found in source registry");
                    missing.lock().push(id);
                }
                Err(e) => {
                    errors.add("Fetch device", &id, e);
                    failed.increment();
                }
            }
        })
        .await;
    }
    pool.close().await;

    let mut missing = std::mem::take(&mut *missing.lock());
    if !missing.is_empty() {
        missing.sort();
        let list: Vec<&str> = missing.iter().map(DeviceId::as_str).collect();
        tracing::warn!(
            count = missing.len(),
            "device IDs not found in source registry: {}",
            list.join(", ")
        );
    }
    Ok(failed.count())
}

/// Page through the whole source registry, recording each page.
async fn list_into_checkpoint(
    source: &Arc<dyn DeviceRegistry>,
    checkpoint: &CheckpointStore,
) -> Result<(), EngineError> {
    let filter = DeviceListFilter::default();
    let mut token: Option<String> = None;
    let mut listed = 0usize;
    loop {
        let page = source
            .list_devices(token.as_deref(), &filter)
            .await
            .map_err(|source| EngineError::Registry {
                context: "List source devices",
                source,
            })?;
        listed += page.devices.len();
        checkpoint.add_fetched_devices(page.devices)?;
        tracing::debug!(listed, "fetched device page");
        match page.next_page_token {
            Some(next) if !next.is_empty() => token = Some(next),
            _ => break,
        }
    }
    checkpoint.set_total_devices(listed)?;
    Ok(())
}

// ─── Config history ─────────────────────────────────────────────────

/// Capture the configuration versions of every device in `devices` whose
/// history is not yet in the checkpoint.
///
/// Returns the number of devices whose history could not be read. Those
/// failures are recorded but do not hold any phase back.
pub async fn fetch_config_history(
    source: &Arc<dyn DeviceRegistry>,
    checkpoint: &Arc<CheckpointStore>,
    errors: &Arc<ErrorAggregator>,
    devices: &[Device],
    workers: usize,
) -> Result<usize, EngineError> {
    let remaining = checkpoint.remaining_devices_for_config(devices);
    if remaining.is_empty() {
        return Ok(0);
    }
    tracing::info!(devices = remaining.len(), "fetching config history");

    let failed = Arc::new(Counter::new());
    let pool = WorkerPool::new(workers)?;
    for device in remaining {
        let source = Arc::clone(source);
        let checkpoint = Arc::clone(checkpoint);
        let errors = Arc::clone(errors);
        let failed = Arc::clone(&failed);
        pool.add_task(async move {
            let id = device.id;
            let result = match source.list_config_versions(&id).await {
                Ok(versions) => checkpoint
                    .add_processed_config(&id, versions)
                    .map_err(|e| ("Save checkpoint", e.to_string())),
                Err(e) => Err(("Fetch config history", e.to_string())),
            };
            if let Err((context, e)) = result {
                errors.add(context, &id, e);
                failed.increment();
            }
        })
        .await;
    }
    pool.close().await;
    Ok(failed.count())
}

// ─── Gateway bindings ───────────────────────────────────────────────

/// Source binding topology for the gateways still to reconcile.
#[derive(Debug, Default)]
pub struct SourceBindings {
    /// `None` when the fetched set holds no gateways at all.
    pub bindings: Option<GatewayBindings>,
    /// Gateways whose bound devices could not be listed.
    pub failed: usize,
}

/// List, per unprocessed gateway among `devices`, the devices the source
/// binds to it.
pub async fn fetch_gateway_bindings(
    source: &Arc<dyn DeviceRegistry>,
    checkpoint: &Arc<CheckpointStore>,
    errors: &Arc<ErrorAggregator>,
    devices: &[Device],
    workers: usize,
) -> Result<SourceBindings, EngineError> {
    let gateways: GatewayBindings = devices
        .iter()
        .filter(|d| d.is_gateway())
        .map(|d| (d.id.clone(), Vec::new()))
        .collect();
    if gateways.is_empty() {
        tracing::info!("no gateways among fetched devices");
        return Ok(SourceBindings::default());
    }

    let pending = checkpoint.unprocessed_gateways(&gateways);
    tracing::info!(
        gateways = gateways.len(),
        pending = pending.len(),
        "fetching gateway bindings"
    );

    let bindings = Arc::new(Mutex::new(GatewayBindings::new()));
    let failed = Arc::new(Counter::new());
    let pool = WorkerPool::new(workers)?;
    for gateway_id in pending {
        let source = Arc::clone(source);
        let errors = Arc::clone(errors);
        let bindings = Arc::clone(&bindings);
        let failed = Arc::clone(&failed);
        pool.add_task(async move {
            match source.list_bound_devices(&gateway_id).await {
                Ok(bound) => {
                    tracing::debug!(gateway_id = %gateway_id, bound = bound.len(), "fetched bindings");
                    bindings.lock().insert(gateway_id, bound);
                }
                Err(e) => {
                    errors.add("Fetch gateway bindings", &gateway_id, e);
                    failed.increment();
                }
            }
        })
        .await;
    }
    pool.close().await;

    let bindings = std::mem::take(&mut *bindings.lock());
    Ok(SourceBindings {
        bindings: Some(bindings),
        failed: failed.count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use regmig_client::{InMemoryRegistry, RegistryOp};
    use regmig_core::{GatewayConfig, GatewayType, RegistryCoordinates};

    fn args(dir: &std::path::Path) -> MigrationArgs {
        MigrationArgs {
            source: RegistryCoordinates {
                project: "p".into(),
                region: "us-central1".into(),
                registry: "src".into(),
            },
            work_dir: dir.to_path_buf(),
            workers: 3,
            ..MigrationArgs::default()
        }
    }

    fn gateway(id: &str) -> Device {
        let mut d = Device::new(id);
        d.gateway_config = Some(GatewayConfig {
            gateway_type: GatewayType::Gateway,
            ..GatewayConfig::default()
        });
        d
    }

    fn setup(
        devices: Vec<Device>,
        args: &MigrationArgs,
    ) -> (Arc<InMemoryRegistry>, Arc<dyn DeviceRegistry>, Arc<CheckpointStore>, Arc<ErrorAggregator>) {
        let registry = Arc::new(InMemoryRegistry::with_devices(devices).with_page_size(2));
        let source: Arc<dyn DeviceRegistry> = registry.clone();
        let (store, _) = CheckpointStore::open(&args.work_dir, args).unwrap();
        (registry, source, Arc::new(store), Arc::new(ErrorAggregator::new()))
    }

    #[tokio::test]
    async fn lists_every_page_and_advances() {
        let dir = tempfile::tempdir().unwrap();
        let args = args(dir.path());
        let devices: Vec<Device> = ["a", "b", "c", "d", "e"].into_iter().map(Device::new).collect();
        let (registry, source, checkpoint, errors) = setup(devices, &args);

        let (fetched, status) = fetch_devices(&source, &checkpoint, &errors, &args).await.unwrap();
        assert_eq!(status, PhaseStatus::Complete);
        assert_eq!(fetched.len(), 5);
        assert_eq!(checkpoint.total_devices(), 5);
        assert_eq!(registry.counts().get(RegistryOp::List), 3);
        assert_eq!(checkpoint.current_phase(), MigrationPhase::DeviceMigrate);
    }

    #[tokio::test]
    async fn completed_fetch_skips_the_network() {
        let dir = tempfile::tempdir().unwrap();
        let args = args(dir.path());
        let (registry, source, checkpoint, errors) = setup(vec![Device::new("a")], &args);
        fetch_devices(&source, &checkpoint, &errors, &args).await.unwrap();
        registry.reset_counts();

        let (fetched, _) = fetch_devices(&source, &checkpoint, &errors, &args).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(registry.counts().total(), 0);
    }

    #[tokio::test]
    async fn explicit_ids_report_missing_devices() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("ids.csv");
        std::fs::write(&csv, "deviceId\na\nghost\nb\n").unwrap();
        let mut args = args(dir.path());
        args.devices_csv = Some(csv);
        let (_, source, checkpoint, errors) =
            setup(vec![Device::new("a"), Device::new("b"), Device::new("c")], &args);

        let (fetched, status) = fetch_devices(&source, &checkpoint, &errors, &args).await.unwrap();
        let ids: Vec<&str> = fetched.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(status, PhaseStatus::Complete);
        assert_eq!(checkpoint.total_devices(), 3);

        let entries = errors.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].context, "Fetch device");
        assert_eq!(entries[0].device_id, Some(DeviceId::new("ghost")));
    }

    #[tokio::test]
    async fn failed_explicit_fetch_leaves_phase_open() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("ids.csv");
        std::fs::write(&csv, "deviceId\na\nb\n").unwrap();
        let mut args = args(dir.path());
        args.devices_csv = Some(csv);
        let (registry, source, checkpoint, errors) =
            setup(vec![Device::new("a"), Device::new("b")], &args);
        registry.fail_on(RegistryOp::Get, &DeviceId::new("b"));

        let (_, status) = fetch_devices(&source, &checkpoint, &errors, &args).await.unwrap();
        assert_eq!(status, PhaseStatus::Incomplete);
        assert_eq!(checkpoint.current_phase(), MigrationPhase::DeviceFetch);

        registry.clear_faults();
        registry.reset_counts();
        let (fetched, status) = fetch_devices(&source, &checkpoint, &errors, &args).await.unwrap();
        assert_eq!(status, PhaseStatus::Complete);
        assert_eq!(fetched.len(), 2);
        assert_eq!(registry.counts().get(RegistryOp::Get), 1);
    }

    #[tokio::test]
    async fn listing_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let args = args(dir.path());
        let (registry, source, checkpoint, errors) = setup(vec![Device::new("a")], &args);
        registry.fail_all(RegistryOp::List);

        let err = fetch_devices(&source, &checkpoint, &errors, &args).await.unwrap_err();
        assert!(matches!(err, EngineError::Registry { context: "List source devices", .. }));
    }

    #[tokio::test]
    async fn config_history_is_captured_once() {
        let dir = tempfile::tempdir().unwrap();
        let args = args(dir.path());
        let devices = vec![Device::new("a"), Device::new("b")];
        let (registry, source, checkpoint, errors) = setup(devices.clone(), &args);
        fetch_devices(&source, &checkpoint, &errors, &args).await.unwrap();
        registry.fail_on(RegistryOp::ListConfigVersions, &DeviceId::new("b"));

        let failed = fetch_config_history(&source, &checkpoint, &errors, &devices, 2).await.unwrap();
        assert_eq!(failed, 1);
        assert_eq!(checkpoint.config_history().len(), 1);

        registry.clear_faults();
        registry.reset_counts();
        let failed = fetch_config_history(&source, &checkpoint, &errors, &devices, 2).await.unwrap();
        assert_eq!(failed, 0);
        assert_eq!(registry.counts().get(RegistryOp::ListConfigVersions), 1);
        assert_eq!(checkpoint.config_history().len(), 2);
    }

    #[tokio::test]
    async fn bindings_cover_only_unprocessed_gateways() {
        let dir = tempfile::tempdir().unwrap();
        let args = args(dir.path());
        let devices = vec![gateway("g1"), gateway("g2"), Device::new("x"), Device::new("y")];
        let (registry, source, checkpoint, errors) = setup(devices.clone(), &args);
        registry.insert_binding(&DeviceId::new("g1"), &DeviceId::new("x"));
        registry.insert_binding(&DeviceId::new("g2"), &DeviceId::new("y"));
        checkpoint.add_processed_gateway(&DeviceId::new("g2")).unwrap();

        let fetched = fetch_gateway_bindings(&source, &checkpoint, &errors, &devices, 2)
            .await
            .unwrap();
        let bindings = fetched.bindings.unwrap();
        assert_eq!(fetched.failed, 0);
        assert_eq!(bindings.len(), 1);
        let bound: Vec<&str> = bindings[&DeviceId::new("g1")].iter().map(|d| d.id.as_str()).collect();
        assert_eq!(bound, vec!["x"]);
    }

    #[tokio::test]
    async fn no_gateways_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let args = args(dir.path());
        let devices = vec![Device::new("x")];
        let (_, source, checkpoint, errors) = setup(devices.clone(), &args);
        let fetched = fetch_gateway_bindings(&source, &checkpoint, &errors, &devices, 2)
            .await
            .unwrap();
        assert!(fetched.bindings.is_none());
    }
}
