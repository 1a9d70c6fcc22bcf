//! # In-Memory Registry
//!
//! A [`DeviceRegistry`] held entirely in memory. It behaves like a remote
//! registry where it matters to the migration engine: creating an existing
//! ID is a `Conflict`, touching a missing one is `NotFound`, listings are
//! paginated, and bindings are a relation between existing devices.
//!
//! Every call is counted by [`RegistryOp`], and failures can be injected
//! per operation and device so tests can exercise partial-failure paths.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use regmig_core::{Device, DeviceConfig, DeviceId, UpdateMask};

use crate::error::RegistryError;
use crate::registry::{ConfigHistory, DeviceListFilter, DevicePage, DeviceRegistry};

/// Registry operation kinds, for counting and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegistryOp {
    List,
    Get,
    Create,
    Patch,
    Delete,
    ModifyConfig,
    ListConfigVersions,
    Bind,
    Unbind,
    UpdateConfigHistory,
}

/// Number of calls made per operation kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationCounts(BTreeMap<RegistryOp, usize>);

impl OperationCounts {
    pub fn get(&self, op: RegistryOp) -> usize {
        self.0.get(&op).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    /// Calls that change registry state.
    pub fn writes(&self) -> usize {
        self.0
            .iter()
            .filter(|(op, _)| {
                !matches!(
                    op,
                    RegistryOp::List | RegistryOp::Get | RegistryOp::ListConfigVersions
                )
            })
            .map(|(_, n)| n)
            .sum()
    }

    fn bump(&mut self, op: RegistryOp) {
        *self.0.entry(op).or_insert(0) += 1;
    }
}

#[derive(Default)]
struct Inner {
    devices: BTreeMap<DeviceId, Device>,
    /// gateway -> bound devices
    bindings: BTreeMap<DeviceId, BTreeSet<DeviceId>>,
    /// newest first
    config_versions: BTreeMap<DeviceId, Vec<DeviceConfig>>,
    history: ConfigHistory,
    counts: OperationCounts,
    /// `None` matches every call of the operation.
    faults: BTreeSet<(RegistryOp, Option<DeviceId>)>,
}

impl Inner {
    fn record(&mut self, op: RegistryOp, id: Option<&DeviceId>) -> Result<(), RegistryError> {
        self.counts.bump(op);
        let hit = self.faults.contains(&(op, None))
            || id.is_some_and(|id| self.faults.contains(&(op, Some(id.clone()))));
        if hit {
            return Err(RegistryError::Api {
                endpoint: format!("{op:?} {}", id.map(DeviceId::as_str).unwrap_or("*")),
                status: 503,
                body: "injected fault".into(),
            });
        }
        Ok(())
    }

    fn require(&self, op: RegistryOp, id: &DeviceId) -> Result<(), RegistryError> {
        if self.devices.contains_key(id) {
            Ok(())
        } else {
            Err(not_found(op, id))
        }
    }
}

fn not_found(op: RegistryOp, id: &DeviceId) -> RegistryError {
    RegistryError::NotFound {
        endpoint: format!("{op:?} {id}"),
    }
}

/// A registry held in memory.
pub struct InMemoryRegistry {
    inner: Mutex<Inner>,
    page_size: usize,
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            page_size: 1000,
        }
    }

    /// A registry pre-populated with `devices`.
    pub fn with_devices(devices: impl IntoIterator<Item = Device>) -> Self {
        let registry = Self::new();
        for device in devices {
            registry.insert_device(device);
        }
        registry
    }

    /// Devices returned per list page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    // ── Seeding and inspection (not counted) ────────────────────────

    pub fn insert_device(&self, device: Device) {
        self.inner.lock().devices.insert(device.id.clone(), device);
    }

    pub fn insert_binding(&self, gateway_id: &DeviceId, device_id: &DeviceId) {
        self.inner
            .lock()
            .bindings
            .entry(gateway_id.clone())
            .or_default()
            .insert(device_id.clone());
    }

    pub fn set_config_versions(&self, id: &DeviceId, versions: Vec<DeviceConfig>) {
        self.inner.lock().config_versions.insert(id.clone(), versions);
    }

    pub fn device(&self, id: &DeviceId) -> Option<Device> {
        self.inner.lock().devices.get(id).cloned()
    }

    pub fn device_ids(&self) -> Vec<DeviceId> {
        self.inner.lock().devices.keys().cloned().collect()
    }

    pub fn bound_device_ids(&self, gateway_id: &DeviceId) -> BTreeSet<DeviceId> {
        self.inner
            .lock()
            .bindings
            .get(gateway_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Config history received through `update_config_history`.
    pub fn config_history(&self) -> ConfigHistory {
        self.inner.lock().history.clone()
    }

    pub fn counts(&self) -> OperationCounts {
        self.inner.lock().counts.clone()
    }

    pub fn reset_counts(&self) {
        self.inner.lock().counts = OperationCounts::default();
    }

    // ── Fault injection ─────────────────────────────────────────────

    /// Fail every `op` call concerning `id` until cleared.
    pub fn fail_on(&self, op: RegistryOp, id: &DeviceId) {
        self.inner.lock().faults.insert((op, Some(id.clone())));
    }

    /// Fail every `op` call until cleared.
    pub fn fail_all(&self, op: RegistryOp) {
        self.inner.lock().faults.insert((op, None));
    }

    pub fn clear_faults(&self) {
        self.inner.lock().faults.clear();
    }
}

#[async_trait]
impl DeviceRegistry for InMemoryRegistry {
    async fn list_devices(
        &self,
        page_token: Option<&str>,
        filter: &DeviceListFilter,
    ) -> Result<DevicePage, RegistryError> {
        let mut inner = self.inner.lock();
        inner.record(RegistryOp::List, filter.associations_gateway_id.as_ref())?;

        let bound = filter
            .associations_gateway_id
            .as_ref()
            .map(|gw| inner.bindings.get(gw).cloned().unwrap_or_default());
        let matching: Vec<&Device> = inner
            .devices
            .values()
            .filter(|d| bound.as_ref().map_or(true, |set| set.contains(&d.id)))
            .filter(|d| !filter.gateways_only || d.is_gateway())
            .collect();

        let start = match page_token {
            Some(token) if !token.is_empty() => {
                token.parse::<usize>().map_err(|_| RegistryError::Api {
                    endpoint: "List".into(),
                    status: 400,
                    body: format!("invalid page token {token:?}"),
                })?
            }
            _ => 0,
        };
        let end = (start + self.page_size).min(matching.len());
        let devices = matching
            .get(start..end)
            .unwrap_or_default()
            .iter()
            .map(|d| (*d).clone())
            .collect();
        let next_page_token = (end < matching.len()).then(|| end.to_string());
        Ok(DevicePage {
            devices,
            next_page_token,
        })
    }

    async fn get_device(&self, id: &DeviceId) -> Result<Device, RegistryError> {
        let mut inner = self.inner.lock();
        inner.record(RegistryOp::Get, Some(id))?;
        inner
            .devices
            .get(id)
            .cloned()
            .ok_or_else(|| not_found(RegistryOp::Get, id))
    }

    async fn create_device(&self, device: &Device) -> Result<Device, RegistryError> {
        let mut inner = self.inner.lock();
        inner.record(RegistryOp::Create, Some(&device.id))?;
        if inner.devices.contains_key(&device.id) {
            return Err(RegistryError::Conflict {
                endpoint: format!("Create {}", device.id),
                body: "device already exists".into(),
            });
        }
        inner.devices.insert(device.id.clone(), device.clone());
        Ok(device.clone())
    }

    async fn patch_device(
        &self,
        id: &DeviceId,
        device: &Device,
        mask: &UpdateMask,
    ) -> Result<Device, RegistryError> {
        let mut inner = self.inner.lock();
        inner.record(RegistryOp::Patch, Some(id))?;
        let existing = inner
            .devices
            .get_mut(id)
            .ok_or_else(|| not_found(RegistryOp::Patch, id))?;

        if mask.contains("credentials") {
            existing.credentials = device.credentials.clone();
        }
        if mask.contains("blocked") {
            existing.blocked = device.blocked;
        }
        if mask.contains("metadata") {
            existing.metadata = device.metadata.clone();
        }
        if mask.contains("logLevel") {
            existing.log_level = device.log_level.clone();
        }
        if mask.contains("gatewayConfig.gatewayAuthMethod") {
            let auth = device
                .gateway_config
                .as_ref()
                .and_then(|g| g.gateway_auth_method.clone());
            existing
                .gateway_config
                .get_or_insert_with(Default::default)
                .gateway_auth_method = auth;
        }
        Ok(existing.clone())
    }

    async fn delete_device(&self, id: &DeviceId) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock();
        inner.record(RegistryOp::Delete, Some(id))?;
        if inner.devices.remove(id).is_none() {
            return Err(not_found(RegistryOp::Delete, id));
        }
        inner.bindings.remove(id);
        for bound in inner.bindings.values_mut() {
            bound.remove(id);
        }
        inner.config_versions.remove(id);
        Ok(())
    }

    async fn modify_config(
        &self,
        id: &DeviceId,
        binary_data: &str,
    ) -> Result<DeviceConfig, RegistryError> {
        let mut inner = self.inner.lock();
        inner.record(RegistryOp::ModifyConfig, Some(id))?;
        inner.require(RegistryOp::ModifyConfig, id)?;

        let versions = inner.config_versions.entry(id.clone()).or_default();
        let next = versions
            .first()
            .and_then(|v| v.version.parse::<u64>().ok())
            .unwrap_or(0)
            + 1;
        let config = DeviceConfig {
            version: next.to_string(),
            binary_data: binary_data.to_string(),
            ..DeviceConfig::default()
        };
        versions.insert(0, config.clone());
        if let Some(device) = inner.devices.get_mut(id) {
            device.config = Some(config.clone());
        }
        Ok(config)
    }

    async fn list_config_versions(
        &self,
        id: &DeviceId,
    ) -> Result<Vec<DeviceConfig>, RegistryError> {
        let mut inner = self.inner.lock();
        inner.record(RegistryOp::ListConfigVersions, Some(id))?;
        inner.require(RegistryOp::ListConfigVersions, id)?;
        Ok(inner.config_versions.get(id).cloned().unwrap_or_default())
    }

    async fn bind_device_to_gateway(
        &self,
        device_id: &DeviceId,
        gateway_id: &DeviceId,
    ) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock();
        inner.record(RegistryOp::Bind, Some(device_id))?;
        inner.require(RegistryOp::Bind, gateway_id)?;
        inner.require(RegistryOp::Bind, device_id)?;
        inner
            .bindings
            .entry(gateway_id.clone())
            .or_default()
            .insert(device_id.clone());
        Ok(())
    }

    async fn unbind_device_from_gateway(
        &self,
        device_id: &DeviceId,
        gateway_id: &DeviceId,
    ) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock();
        inner.record(RegistryOp::Unbind, Some(device_id))?;
        if let Some(bound) = inner.bindings.get_mut(gateway_id) {
            bound.remove(device_id);
        }
        Ok(())
    }

    async fn update_config_history(&self, history: &ConfigHistory) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock();
        inner.record(RegistryOp::UpdateConfigHistory, None)?;
        for (id, versions) in history {
            inner.history.insert(id.clone(), versions.clone());
        }
        Ok(())
    }
}
