//! # Checkpoint Store
//!
//! The file-backed record of migration progress.
//!
//! ## File format
//!
//! `{work_dir}/migration_checkpoint.json`, pretty-printed:
//!
//! ```json
//! {
//!   "start_time": "...", "last_updated": "...",
//!   "current_phase": "device_migrate",
//!   "completed_phases": ["device_fetch"],
//!   "devices_fetched": {"id": { device }},
//!   "devices_migrated": {"id": true},
//!   "configs_processed": {"id": true},
//!   "config_history": {"id": [ config versions ]},
//!   "gateways_processed": {"id": true},
//!   "total_devices": 0,
//!   "args": { run arguments }
//! }
//! ```
//!
//! Set-valued fields are written as `id → true`; on load only the keys
//! matter. `null` collections load as empty.
//!
//! ## Invariants
//!
//! - `current_phase` only moves forward; `completed_phases` holds each phase
//!   at most once.
//! - A device is recorded as migrated only if it was recorded as fetched.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use regmig_core::{Device, DeviceConfig, DeviceId, GatewayBindings, MigrationArgs};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::CheckpointError;
use crate::phase::MigrationPhase;

/// Checkpoint file name inside the work directory.
pub const CHECKPOINT_FILE: &str = "migration_checkpoint.json";

// ─── Serialized state ───────────────────────────────────────────────

/// Everything the checkpoint file holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub start_time: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub current_phase: MigrationPhase,
    #[serde(default, deserialize_with = "null_as_default")]
    pub completed_phases: Vec<MigrationPhase>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub devices_fetched: BTreeMap<DeviceId, Device>,
    #[serde(default, with = "id_set")]
    pub devices_migrated: BTreeSet<DeviceId>,
    #[serde(default, with = "id_set")]
    pub configs_processed: BTreeSet<DeviceId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub config_history: BTreeMap<DeviceId, Vec<DeviceConfig>>,
    #[serde(default, with = "id_set")]
    pub gateways_processed: BTreeSet<DeviceId>,
    #[serde(default)]
    pub total_devices: usize,
    #[serde(default)]
    pub args: Option<MigrationArgs>,
}

impl CheckpointState {
    /// A fresh state at the first phase.
    pub fn new(args: &MigrationArgs) -> Self {
        let now = Utc::now();
        Self {
            start_time: now,
            last_updated: now,
            current_phase: MigrationPhase::DeviceFetch,
            completed_phases: Vec::new(),
            devices_fetched: BTreeMap::new(),
            devices_migrated: BTreeSet::new(),
            configs_processed: BTreeSet::new(),
            config_history: BTreeMap::new(),
            gateways_processed: BTreeSet::new(),
            total_devices: 0,
            args: Some(args.clone()),
        }
    }

    pub fn progress(&self) -> CheckpointProgress {
        CheckpointProgress {
            current_phase: self.current_phase,
            completed_phases: self.completed_phases.clone(),
            start_time: self.start_time,
            last_updated: self.last_updated,
            total_devices: self.total_devices,
            fetched: self.devices_fetched.len(),
            migrated: self.devices_migrated.len(),
            configs_processed: self.configs_processed.len(),
            gateways_processed: self.gateways_processed.len(),
        }
    }

    fn mark_completed(&mut self, phase: MigrationPhase) {
        if !self.completed_phases.contains(&phase) {
            self.completed_phases.push(phase);
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// `BTreeSet<DeviceId>` as a JSON object `{id: true}`.
mod id_set {
    use std::collections::{BTreeMap, BTreeSet};

    use regmig_core::DeviceId;
    use serde::de::IgnoredAny;
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(set: &BTreeSet<DeviceId>, s: S) -> Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(set.len()))?;
        for id in set {
            map.serialize_entry(id, &true)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeSet<DeviceId>, D::Error> {
        let map = Option::<BTreeMap<DeviceId, IgnoredAny>>::deserialize(d)?;
        Ok(map.map(|m| m.into_keys().collect()).unwrap_or_default())
    }
}

/// Counts summarizing a checkpoint, for logs and the status command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointProgress {
    pub current_phase: MigrationPhase,
    pub completed_phases: Vec<MigrationPhase>,
    pub start_time: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub total_devices: usize,
    pub fetched: usize,
    pub migrated: usize,
    pub configs_processed: usize,
    pub gateways_processed: usize,
}

impl std::fmt::Display for CheckpointProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "phase {}: {} devices fetched, {} migrated, {} configs processed, {} gateways processed",
            self.current_phase,
            self.fetched,
            self.migrated,
            self.configs_processed,
            self.gateways_processed
        )
    }
}

// ─── Store ──────────────────────────────────────────────────────────

/// Shared, durable checkpoint.
///
/// All methods take `&self`; the store is shared across worker tasks
/// behind an `Arc`.
pub struct CheckpointStore {
    work_dir: PathBuf,
    path: PathBuf,
    state: RwLock<CheckpointState>,
}

impl std::fmt::Debug for CheckpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointStore")
            .field("path", &self.path)
            .field("progress", &self.state.read().progress())
            .finish()
    }
}

impl CheckpointStore {
    /// Path of the checkpoint file in `work_dir`.
    pub fn path_in(work_dir: &Path) -> PathBuf {
        work_dir.join(CHECKPOINT_FILE)
    }

    /// Read the checkpoint in `work_dir` without opening a store.
    ///
    /// `Ok(None)` when there is no checkpoint file.
    pub fn load(work_dir: &Path) -> Result<Option<CheckpointState>, CheckpointError> {
        let path = Self::path_in(work_dir);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CheckpointError::Io { path, source }),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|source| CheckpointError::Corrupt { path, source })
    }

    /// Load the checkpoint in `work_dir`, or start and persist a fresh one.
    ///
    /// Returns the store and whether it resumed an earlier run. On resume,
    /// arguments that differ from those the checkpoint was created with are
    /// logged; the current arguments govern the run.
    pub fn open(work_dir: &Path, args: &MigrationArgs) -> Result<(Self, bool), CheckpointError> {
        let (state, resumed) = match Self::load(work_dir)? {
            Some(state) => {
                let progress = state.progress();
                tracing::info!(
                    phase = %progress.current_phase,
                    fetched = progress.fetched,
                    migrated = progress.migrated,
                    configs_processed = progress.configs_processed,
                    gateways_processed = progress.gateways_processed,
                    "found existing checkpoint, resuming migration"
                );
                if let Some(stored) = &state.args {
                    let diff = stored.differences(args);
                    if !diff.is_empty() {
                        tracing::warn!(
                            changed = ?diff,
                            "run arguments differ from those the checkpoint was created with"
                        );
                    }
                }
                (state, true)
            }
            None => {
                tracing::info!("starting fresh migration with checkpoint tracking");
                (CheckpointState::new(args), false)
            }
        };

        let store = Self {
            work_dir: work_dir.to_path_buf(),
            path: Self::path_in(work_dir),
            state: RwLock::new(state),
        };
        if !resumed {
            store.mutate(|_| Ok(()))?;
        }
        Ok((store, resumed))
    }

    /// Delete the checkpoint in `work_dir`. Returns whether one existed.
    pub fn remove(work_dir: &Path) -> Result<bool, CheckpointError> {
        let path = Self::path_in(work_dir);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(CheckpointError::Io { path, source }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrite the whole file. Caller holds the write lock.
    fn persist(&self, state: &mut CheckpointState) -> Result<(), CheckpointError> {
        state.last_updated = Utc::now();
        std::fs::create_dir_all(&self.work_dir).map_err(|source| CheckpointError::Io {
            path: self.work_dir.clone(),
            source,
        })?;
        let body = serde_json::to_vec_pretty(state).map_err(CheckpointError::Serialize)?;

        let tmp = self.path.with_file_name(format!(
            ".{CHECKPOINT_FILE}.tmp.{}",
            std::process::id()
        ));
        std::fs::write(&tmp, body).map_err(|source| CheckpointError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| CheckpointError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Apply `f` to a copy of the state and swap it in once the copy is on
    /// disk. On any error the in-memory state is left untouched.
    fn mutate<F>(&self, f: F) -> Result<(), CheckpointError>
    where
        F: FnOnce(&mut CheckpointState) -> Result<(), CheckpointError>,
    {
        let mut state = self.state.write();
        let mut next = state.clone();
        f(&mut next)?;
        self.persist(&mut next)?;
        *state = next;
        Ok(())
    }

    // ── Phase ───────────────────────────────────────────────────────

    pub fn current_phase(&self) -> MigrationPhase {
        self.state.read().current_phase
    }

    /// Advance to `phase`, recording the current phase as completed.
    ///
    /// Setting the current phase again is a no-op; moving backwards is
    /// rejected.
    pub fn set_phase(&self, phase: MigrationPhase) -> Result<(), CheckpointError> {
        if self.current_phase() == phase {
            return Ok(());
        }
        self.mutate(|state| {
            let from = state.current_phase;
            if phase < from {
                return Err(CheckpointError::InvalidTransition { from, to: phase });
            }
            state.mark_completed(from);
            state.current_phase = phase;
            tracing::debug!(from = %from, to = %phase, "checkpoint phase advanced");
            Ok(())
        })
    }

    /// Whether `phase` appears in the completed history.
    pub fn is_phase_completed(&self, phase: MigrationPhase) -> bool {
        self.state.read().completed_phases.contains(&phase)
    }

    /// Mark the run complete, persist, then delete the file.
    ///
    /// A file that cannot be deleted is logged, not returned as an error:
    /// the run itself has finished.
    pub fn complete(&self) -> Result<(), CheckpointError> {
        self.mutate(|state| {
            let from = state.current_phase;
            state.mark_completed(from);
            state.current_phase = MigrationPhase::Complete;
            state.mark_completed(MigrationPhase::Complete);
            Ok(())
        })?;
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), "could not remove checkpoint file: {e}");
        }
        Ok(())
    }

    // ── Recording ───────────────────────────────────────────────────

    pub fn add_fetched_device(&self, device: Device) -> Result<(), CheckpointError> {
        self.mutate(|s| {
            s.devices_fetched.insert(device.id.clone(), device);
            Ok(())
        })
    }

    /// Record many fetched devices with a single write.
    pub fn add_fetched_devices(
        &self,
        devices: impl IntoIterator<Item = Device>,
    ) -> Result<(), CheckpointError> {
        self.mutate(|s| {
            for device in devices {
                s.devices_fetched.insert(device.id.clone(), device);
            }
            Ok(())
        })
    }

    pub fn add_migrated_device(&self, id: &DeviceId) -> Result<(), CheckpointError> {
        self.mutate(|s| {
            if !s.devices_fetched.contains_key(id) {
                return Err(CheckpointError::UnknownDevice { id: id.clone() });
            }
            s.devices_migrated.insert(id.clone());
            Ok(())
        })
    }

    pub fn add_processed_config(
        &self,
        id: &DeviceId,
        configs: Vec<DeviceConfig>,
    ) -> Result<(), CheckpointError> {
        self.mutate(|s| {
            s.configs_processed.insert(id.clone());
            s.config_history.insert(id.clone(), configs);
            Ok(())
        })
    }

    pub fn add_processed_gateway(&self, id: &DeviceId) -> Result<(), CheckpointError> {
        self.mutate(|s| {
            s.gateways_processed.insert(id.clone());
            Ok(())
        })
    }

    pub fn set_total_devices(&self, count: usize) -> Result<(), CheckpointError> {
        self.mutate(|s| {
            s.total_devices = count;
            Ok(())
        })
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// The subset of `ids` not yet fetched, in input order.
    pub fn unfetched_device_ids(&self, ids: &[DeviceId]) -> Vec<DeviceId> {
        let state = self.state.read();
        ids.iter()
            .filter(|id| !state.devices_fetched.contains_key(*id))
            .cloned()
            .collect()
    }

    /// Every fetched device, ordered by ID.
    pub fn fetched_devices(&self) -> Vec<Device> {
        self.state.read().devices_fetched.values().cloned().collect()
    }

    pub fn is_migrated(&self, id: &DeviceId) -> bool {
        self.state.read().devices_migrated.contains(id)
    }

    pub fn migrated_count(&self) -> usize {
        self.state.read().devices_migrated.len()
    }

    /// Devices of `all` not yet migrated.
    pub fn remaining_devices_for_migration(&self, all: &[Device]) -> Vec<Device> {
        let state = self.state.read();
        all.iter()
            .filter(|d| !state.devices_migrated.contains(&d.id))
            .cloned()
            .collect()
    }

    /// Devices of `all` whose config history has not been captured.
    pub fn remaining_devices_for_config(&self, all: &[Device]) -> Vec<Device> {
        let state = self.state.read();
        all.iter()
            .filter(|d| !state.configs_processed.contains(&d.id))
            .cloned()
            .collect()
    }

    /// Gateways of `bindings` not yet processed.
    pub fn unprocessed_gateways(&self, bindings: &GatewayBindings) -> Vec<DeviceId> {
        let state = self.state.read();
        bindings
            .keys()
            .filter(|gw| !state.gateways_processed.contains(*gw))
            .cloned()
            .collect()
    }

    /// Captured config history, keyed by device.
    pub fn config_history(&self) -> BTreeMap<DeviceId, Vec<DeviceConfig>> {
        self.state.read().config_history.clone()
    }

    pub fn total_devices(&self) -> usize {
        self.state.read().total_devices
    }

    pub fn progress(&self) -> CheckpointProgress {
        self.state.read().progress()
    }

    /// A copy of the full state.
    pub fn snapshot(&self) -> CheckpointState {
        self.state.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn args() -> MigrationArgs {
        MigrationArgs::default()
    }

    fn open(dir: &Path) -> CheckpointStore {
        CheckpointStore::open(dir, &args()).unwrap().0
    }

    #[test]
    fn fresh_open_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let (store, resumed) = CheckpointStore::open(dir.path(), &args()).unwrap();
        assert!(!resumed);
        assert!(store.path().exists());
        assert_eq!(store.current_phase(), MigrationPhase::DeviceFetch);
    }

    #[test]
    fn open_creates_missing_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        let store = open(&nested);
        assert!(store.path().exists());
    }

    #[test]
    fn reopen_resumes_recorded_progress() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open(dir.path());
            store.add_fetched_device(Device::new("a")).unwrap();
            store.add_fetched_device(Device::new("b")).unwrap();
            store.set_phase(MigrationPhase::DeviceMigrate).unwrap();
            store.add_migrated_device(&DeviceId::new("a")).unwrap();
        }
        let (store, resumed) = CheckpointStore::open(dir.path(), &args()).unwrap();
        assert!(resumed);
        assert_eq!(store.current_phase(), MigrationPhase::DeviceMigrate);
        assert!(store.is_phase_completed(MigrationPhase::DeviceFetch));
        let remaining = store.remaining_devices_for_migration(&store.fetched_devices());
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, DeviceId::new("b"));
    }

    #[test]
    fn sets_serialize_as_id_to_true() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        store.add_fetched_device(Device::new("a")).unwrap();
        store.add_migrated_device(&DeviceId::new("a")).unwrap();
        store.add_processed_gateway(&DeviceId::new("gw")).unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(raw["devices_migrated"], serde_json::json!({"a": true}));
        assert_eq!(raw["gateways_processed"], serde_json::json!({"gw": true}));
        assert_eq!(raw["current_phase"], "device_fetch");
        assert_eq!(raw["devices_fetched"]["a"]["id"], "a");
    }

    #[test]
    fn load_accepts_any_set_values_and_nulls() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            CheckpointStore::path_in(dir.path()),
            r#"{
                "start_time": "2024-01-01T00:00:00Z",
                "last_updated": "2024-01-01T00:00:00Z",
                "current_phase": "gateway_binding",
                "completed_phases": ["device_fetch", "device_migrate", "config_history"],
                "devices_fetched": {"a": {"id": "a"}},
                "devices_migrated": {"a": {}},
                "configs_processed": null,
                "config_history": null,
                "gateways_processed": {"g": 1},
                "total_devices": 1
            }"#,
        )
        .unwrap();
        let state = CheckpointStore::load(dir.path()).unwrap().unwrap();
        assert!(state.devices_migrated.contains(&DeviceId::new("a")));
        assert!(state.gateways_processed.contains(&DeviceId::new("g")));
        assert!(state.configs_processed.is_empty());
        assert!(state.args.is_none());
    }

    #[test]
    fn corrupt_checkpoint_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(CheckpointStore::path_in(dir.path()), "{ not json").unwrap();
        let err = CheckpointStore::open(dir.path(), &args()).unwrap_err();
        assert!(matches!(err, CheckpointError::Corrupt { .. }));
    }

    #[test]
    fn missing_checkpoint_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CheckpointStore::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn backwards_transition_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        store.set_phase(MigrationPhase::DeviceMigrate).unwrap();
        let err = store.set_phase(MigrationPhase::DeviceFetch).unwrap_err();
        assert!(matches!(err, CheckpointError::InvalidTransition { .. }));
    }

    #[test]
    fn repeated_set_phase_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        store.set_phase(MigrationPhase::DeviceMigrate).unwrap();
        store.set_phase(MigrationPhase::DeviceMigrate).unwrap();
        assert_eq!(
            store.snapshot().completed_phases,
            vec![MigrationPhase::DeviceFetch]
        );
    }

    #[test]
    fn migrated_requires_fetched() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        let err = store.add_migrated_device(&DeviceId::new("ghost")).unwrap_err();
        assert!(matches!(err, CheckpointError::UnknownDevice { .. }));
        assert_eq!(store.migrated_count(), 0);
    }

    #[test]
    fn failed_write_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("work");
        let store = open(&work);
        store.add_fetched_device(Device::new("a")).unwrap();

        std::fs::remove_dir_all(&work).unwrap();
        std::fs::write(&work, b"not a directory").unwrap();

        assert!(store.add_fetched_device(Device::new("b")).is_err());
        assert!(store.add_migrated_device(&DeviceId::new("a")).is_err());
        assert!(store.set_phase(MigrationPhase::DeviceMigrate).is_err());

        let progress = store.progress();
        assert_eq!(progress.fetched, 1);
        assert_eq!(progress.migrated, 0);
        assert_eq!(progress.current_phase, MigrationPhase::DeviceFetch);
        assert!(!store.is_migrated(&DeviceId::new("a")));
    }

    #[test]
    fn set_difference_queries() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        store.add_fetched_device(Device::new("a")).unwrap();
        store
            .add_processed_config(&DeviceId::new("a"), vec![DeviceConfig::default()])
            .unwrap();

        let ids = [DeviceId::new("a"), DeviceId::new("b")];
        assert_eq!(store.unfetched_device_ids(&ids), vec![DeviceId::new("b")]);

        let all = [Device::new("a"), Device::new("b")];
        let remaining = store.remaining_devices_for_config(&all);
        assert_eq!(remaining.len(), 1);
        assert_eq!(store.config_history().len(), 1);

        let mut bindings = GatewayBindings::new();
        bindings.insert(DeviceId::new("g1"), vec![]);
        bindings.insert(DeviceId::new("g2"), vec![]);
        store.add_processed_gateway(&DeviceId::new("g1")).unwrap();
        assert_eq!(store.unprocessed_gateways(&bindings), vec![DeviceId::new("g2")]);
    }

    #[test]
    fn complete_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        store.set_phase(MigrationPhase::GatewayBinding).unwrap();
        store.complete().unwrap();
        assert!(!store.path().exists());
        assert_eq!(store.current_phase(), MigrationPhase::Complete);
        let done = store.snapshot().completed_phases;
        assert_eq!(
            done,
            vec![
                MigrationPhase::DeviceFetch,
                MigrationPhase::GatewayBinding,
                MigrationPhase::Complete
            ]
        );
    }

    #[test]
    fn remove_reports_whether_file_existed() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!CheckpointStore::remove(dir.path()).unwrap());
        let _store = open(dir.path());
        assert!(CheckpointStore::remove(dir.path()).unwrap());
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        for i in 0..5 {
            store.add_fetched_device(Device::new(format!("d{i}"))).unwrap();
        }
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![CHECKPOINT_FILE.to_string()]);
    }

    fn phase_strategy() -> impl Strategy<Value = MigrationPhase> {
        prop::sample::select(MigrationPhase::ALL.to_vec())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn phases_only_advance(targets in prop::collection::vec(phase_strategy(), 1..12)) {
            let dir = tempfile::tempdir().unwrap();
            let store = open(dir.path());
            let mut last = store.current_phase();
            for target in targets {
                let _ = store.set_phase(target);
                let now = store.current_phase();
                prop_assert!(now >= last);
                last = now;

                let done = store.snapshot().completed_phases;
                let unique: BTreeSet<_> = done.iter().copied().collect();
                prop_assert_eq!(unique.len(), done.len());
                prop_assert!(!done.contains(&now) || now.is_terminal());
            }
        }
    }
}
