//! End-to-end migration runs against in-memory registries.
//!
//! ## Scenarios
//!
//! | Scenario | Test |
//! |----------|------|
//! | Destination already holds some devices | `existing_device_is_patched_new_device_created` |
//! | Stale destination bindings | `gateway_bindings_converge_on_source` |
//! | Item failure, then resume | `failed_item_leaves_run_incomplete_then_resume_finishes` |
//! | Checkpoint deleted between runs | `deleted_checkpoint_means_fresh_run` |
//! | Repeated full runs | `full_rerun_creates_no_duplicates` |
//! | Export instead of migrate | `export_mode_writes_batches_without_destination` |
//! | Export over an unfinished migration | `export_refuses_unfinished_migration_checkpoint` |

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use regmig_client::{DeviceRegistry, InMemoryRegistry, RegistryOp};
use regmig_core::{
    Device, DeviceConfig, DeviceId, GatewayConfig, GatewayType, MigrationArgs, RegistryCoordinates,
};
use regmig_engine::{EngineError, MigrationOutcome, Migrator};
use regmig_state::{CheckpointStore, MigrationPhase};

fn coords(registry: &str) -> RegistryCoordinates {
    RegistryCoordinates {
        project: "acme".into(),
        region: "us-central1".into(),
        registry: registry.into(),
    }
}

fn args(dir: &Path) -> MigrationArgs {
    MigrationArgs {
        source: coords("old-fleet"),
        destination: Some(coords("new-fleet")),
        work_dir: dir.to_path_buf(),
        workers: 4,
        ..MigrationArgs::default()
    }
}

fn device(id: &str) -> Device {
    let mut d = Device::new(id);
    d.metadata.insert("owner".into(), format!("team-{id}"));
    d.config = Some(DeviceConfig {
        version: "1".into(),
        binary_data: "e30=".into(),
        ..DeviceConfig::default()
    });
    d
}

fn gateway(id: &str) -> Device {
    let mut d = device(id);
    d.gateway_config = Some(GatewayConfig {
        gateway_type: GatewayType::Gateway,
        gateway_auth_method: Some("ASSOCIATION_ONLY".into()),
        ..GatewayConfig::default()
    });
    d
}

fn ids(list: &[&str]) -> BTreeSet<DeviceId> {
    list.iter().map(|s| DeviceId::new(*s)).collect()
}

fn migrator(
    args: MigrationArgs,
    source: &Arc<InMemoryRegistry>,
    destination: &Arc<InMemoryRegistry>,
) -> Migrator {
    let source: Arc<dyn DeviceRegistry> = source.clone();
    let destination: Arc<dyn DeviceRegistry> = destination.clone();
    Migrator::new(args, source).with_destination(destination)
}

// ── Upsert ──────────────────────────────────────────────────────────

#[tokio::test]
async fn existing_device_is_patched_new_device_created() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(InMemoryRegistry::with_devices([device("A"), device("B")]));
    let destination = Arc::new(InMemoryRegistry::with_devices([Device::new("A")]));

    let summary = migrator(args(dir.path()), &source, &destination)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.outcome, MigrationOutcome::Completed);
    assert_eq!(summary.created, 1);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.migrated, 2);
    assert_eq!(summary.error_count, 0);
    assert!(summary.report_path.is_none());
    assert!(!CheckpointStore::path_in(dir.path()).exists());

    let a = destination.device(&DeviceId::new("A")).unwrap();
    assert_eq!(a.metadata.get("owner").map(String::as_str), Some("team-A"));
    assert_eq!(destination.counts().get(RegistryOp::Patch), 1);
    assert_eq!(destination.config_history().len(), 2);
}

#[tokio::test]
async fn full_rerun_creates_no_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(InMemoryRegistry::with_devices([device("A"), device("B"), device("C")]));
    let destination = Arc::new(InMemoryRegistry::new());

    migrator(args(dir.path()), &source, &destination).run().await.unwrap();
    let first: Vec<Device> = destination
        .device_ids()
        .iter()
        .filter_map(|id| destination.device(id))
        .collect();

    let summary = migrator(args(dir.path()), &source, &destination)
        .run()
        .await
        .unwrap();
    assert!(!summary.resumed);
    assert_eq!(summary.created, 0);
    assert_eq!(summary.updated, 3);

    assert_eq!(destination.device_ids(), vec![
        DeviceId::new("A"),
        DeviceId::new("B"),
        DeviceId::new("C")
    ]);
    for before in first {
        let after = destination.device(&before.id).unwrap();
        assert_eq!(after.metadata, before.metadata);
        assert_eq!(after.credentials, before.credentials);
        assert_eq!(after.latest_config_data(), before.latest_config_data());
    }
}

// ── Gateway reconciliation ──────────────────────────────────────────

#[tokio::test]
async fn gateway_bindings_converge_on_source() {
    let dir = tempfile::tempdir().unwrap();
    let g = DeviceId::new("G");

    let source = Arc::new(InMemoryRegistry::with_devices([
        gateway("G"),
        device("X"),
        device("Y"),
    ]));
    source.insert_binding(&g, &DeviceId::new("X"));
    source.insert_binding(&g, &DeviceId::new("Y"));

    let destination = Arc::new(InMemoryRegistry::with_devices([
        gateway("G"),
        device("Y"),
        device("Z"),
    ]));
    destination.insert_binding(&g, &DeviceId::new("Y"));
    destination.insert_binding(&g, &DeviceId::new("Z"));

    let summary = migrator(args(dir.path()), &source, &destination)
        .run()
        .await
        .unwrap();

    assert!(summary.is_complete());
    assert_eq!(summary.gateways_processed, 1);
    assert_eq!(destination.bound_device_ids(&g), ids(&["X", "Y"]));
    assert!(destination.device(&DeviceId::new("Z")).is_some());
}

// ── Resume ──────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_item_leaves_run_incomplete_then_resume_finishes() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(InMemoryRegistry::with_devices([
        device("A"),
        device("B"),
        device("C"),
    ]));
    let destination = Arc::new(InMemoryRegistry::new());
    destination.fail_on(RegistryOp::Create, &DeviceId::new("B"));

    let first = migrator(args(dir.path()), &source, &destination)
        .run()
        .await
        .unwrap();
    assert_eq!(
        first.outcome,
        MigrationOutcome::Incomplete {
            phase: MigrationPhase::DeviceMigrate
        }
    );
    assert_eq!(first.migrated, 2);
    assert_eq!(first.error_count, 1);
    let report = first.report_path.clone().unwrap();
    let text = std::fs::read_to_string(&report).unwrap();
    assert!(text.starts_with("context,error,deviceId\n"));
    assert!(text.contains("Create device"));
    assert!(CheckpointStore::path_in(dir.path()).exists());
    let first_ops = source.counts().total() + destination.counts().total();

    destination.clear_faults();
    source.reset_counts();
    destination.reset_counts();

    let second = migrator(args(dir.path()), &source, &destination)
        .run()
        .await
        .unwrap();
    assert!(second.resumed);
    assert!(second.is_complete());
    assert_eq!(second.created, 1);
    assert_eq!(second.migrated, 3);
    assert_eq!(source.counts().total(), 0);
    assert_eq!(destination.counts().get(RegistryOp::Create), 1);
    assert!(source.counts().total() + destination.counts().total() < first_ops);
    assert!(!CheckpointStore::path_in(dir.path()).exists());
}

#[tokio::test]
async fn deleted_checkpoint_means_fresh_run() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(InMemoryRegistry::with_devices([device("A"), device("B")]));
    let destination = Arc::new(InMemoryRegistry::new());
    destination.fail_on(RegistryOp::Create, &DeviceId::new("B"));

    let first = migrator(args(dir.path()), &source, &destination)
        .run()
        .await
        .unwrap();
    assert!(!first.is_complete());
    assert!(CheckpointStore::remove(dir.path()).unwrap());

    destination.clear_faults();
    source.reset_counts();
    destination.reset_counts();

    let second = migrator(args(dir.path()), &source, &destination)
        .run()
        .await
        .unwrap();
    assert!(!second.resumed);
    assert!(second.is_complete());
    assert_eq!(source.counts().get(RegistryOp::List), 1);
    assert_eq!(destination.counts().get(RegistryOp::Create), 2);
    assert_eq!(second.created, 1);
    assert_eq!(second.updated, 1);
}

#[tokio::test]
async fn binding_failure_resumes_in_gateway_phase() {
    let dir = tempfile::tempdir().unwrap();
    let g = DeviceId::new("G");
    let source = Arc::new(InMemoryRegistry::with_devices([gateway("G"), device("X")]));
    source.insert_binding(&g, &DeviceId::new("X"));
    let destination = Arc::new(InMemoryRegistry::new());
    destination.fail_on(RegistryOp::Bind, &DeviceId::new("X"));

    let first = migrator(args(dir.path()), &source, &destination)
        .run()
        .await
        .unwrap();
    assert_eq!(
        first.outcome,
        MigrationOutcome::Incomplete {
            phase: MigrationPhase::GatewayBinding
        }
    );

    destination.clear_faults();
    destination.reset_counts();
    let second = migrator(args(dir.path()), &source, &destination)
        .run()
        .await
        .unwrap();
    assert!(second.is_complete());
    assert_eq!(destination.counts().get(RegistryOp::Create), 0);
    assert_eq!(destination.counts().get(RegistryOp::UpdateConfigHistory), 0);
    assert_eq!(destination.bound_device_ids(&g), ids(&["X"]));
}

// ── Options ─────────────────────────────────────────────────────────

#[tokio::test]
async fn export_mode_writes_batches_without_destination() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(InMemoryRegistry::with_devices([
        device("c"),
        device("a"),
        device("b"),
    ]));
    let mut args = args(dir.path());
    args.destination = None;
    args.export_batch_size = 2;

    let source_dyn: Arc<dyn DeviceRegistry> = source.clone();
    let summary = Migrator::new(args, source_dyn).run().await.unwrap();

    assert!(summary.is_complete());
    assert_eq!(summary.exported.len(), 2);
    let first = std::fs::read_to_string(&summary.exported[0]).unwrap();
    assert_eq!(first, "deviceId\na\nb\n");
    assert!(!CheckpointStore::path_in(dir.path()).exists());
}

#[tokio::test]
async fn export_refuses_unfinished_migration_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(InMemoryRegistry::with_devices([device("A"), device("B")]));
    let destination = Arc::new(InMemoryRegistry::new());
    destination.fail_on(RegistryOp::Create, &DeviceId::new("B"));

    let first = migrator(args(dir.path()), &source, &destination)
        .run()
        .await
        .unwrap();
    assert!(!first.is_complete());
    let before = CheckpointStore::load(dir.path()).unwrap().unwrap();

    let mut export = args(dir.path());
    export.destination = None;
    export.export_batch_size = 10;
    let source_dyn: Arc<dyn DeviceRegistry> = source.clone();
    let err = Migrator::new(export, source_dyn).run().await.unwrap_err();
    assert!(matches!(err, EngineError::CheckpointInUse { .. }));

    let after = CheckpointStore::load(dir.path()).unwrap().unwrap();
    assert_eq!(after, before);
    assert!(!dir.path().join("batch_1.csv").exists());

    destination.clear_faults();
    let resumed = migrator(args(dir.path()), &source, &destination)
        .run()
        .await
        .unwrap();
    assert!(resumed.resumed);
    assert!(resumed.is_complete());
}

#[tokio::test]
async fn missing_destination_is_a_setup_error() {
    let dir = tempfile::tempdir().unwrap();
    let source: Arc<dyn DeviceRegistry> = Arc::new(InMemoryRegistry::new());
    let err = Migrator::new(args(dir.path()), source).run().await.unwrap_err();
    assert!(matches!(err, EngineError::MissingDestination));
}

#[tokio::test]
async fn cleanup_empties_destination_before_fresh_run() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(InMemoryRegistry::with_devices([device("A")]));
    let destination = Arc::new(InMemoryRegistry::with_devices([device("stale")]));
    let mut args = args(dir.path());
    args.cleanup_destination = true;

    let summary = migrator(args, &source, &destination).run().await.unwrap();
    assert!(summary.is_complete());
    assert_eq!(destination.device_ids(), vec![DeviceId::new("A")]);
}

#[tokio::test]
async fn cleanup_is_skipped_when_resuming_a_started_migration() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(InMemoryRegistry::with_devices([device("A"), device("B")]));
    let destination = Arc::new(InMemoryRegistry::new());
    destination.fail_on(RegistryOp::Create, &DeviceId::new("B"));
    let mut args = args(dir.path());
    args.cleanup_destination = true;

    migrator(args.clone(), &source, &destination).run().await.unwrap();
    destination.clear_faults();
    destination.reset_counts();

    let summary = migrator(args, &source, &destination).run().await.unwrap();
    assert!(summary.is_complete());
    assert_eq!(destination.counts().get(RegistryOp::Delete), 0);
    assert_eq!(destination.device_ids(), vec![DeviceId::new("A"), DeviceId::new("B")]);
}

#[tokio::test]
async fn config_history_can_be_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(InMemoryRegistry::with_devices([device("A")]));
    let destination = Arc::new(InMemoryRegistry::new());
    let mut args = args(dir.path());
    args.config_history = false;

    migrator(args, &source, &destination).run().await.unwrap();
    assert_eq!(source.counts().get(RegistryOp::ListConfigVersions), 0);
    assert_eq!(destination.counts().get(RegistryOp::UpdateConfigHistory), 0);
}
