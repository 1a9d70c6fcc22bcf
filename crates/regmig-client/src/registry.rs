//! # Registry Contract
//!
//! The operations the migration engine consumes from a device registry.
//! Source and destination are two independent implementations of the same
//! trait object.

use std::collections::BTreeMap;

use async_trait::async_trait;
use regmig_core::{Device, DeviceConfig, DeviceId, UpdateMask};

use crate::error::RegistryError;

/// Config version history per device, in the shape pushed to the
/// destination's history endpoint.
pub type ConfigHistory = BTreeMap<DeviceId, Vec<DeviceConfig>>;

/// Restricts a device listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceListFilter {
    /// Only devices bound to this gateway.
    pub associations_gateway_id: Option<DeviceId>,
    /// Only devices whose gateway type is `GATEWAY`.
    pub gateways_only: bool,
}

impl DeviceListFilter {
    /// Devices bound to `gateway_id`.
    pub fn bound_to(gateway_id: &DeviceId) -> Self {
        Self {
            associations_gateway_id: Some(gateway_id.clone()),
            gateways_only: false,
        }
    }

    /// Gateways only.
    pub fn gateways() -> Self {
        Self {
            associations_gateway_id: None,
            gateways_only: true,
        }
    }
}

/// One page of a device listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DevicePage {
    pub devices: Vec<Device>,
    /// Continuation token; `None` on the last page.
    pub next_page_token: Option<String>,
}

/// A device registry.
///
/// Errors distinguish [`RegistryError::NotFound`] and
/// [`RegistryError::Conflict`] from other failures; the engine branches on
/// them.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// One page of devices matching `filter`.
    async fn list_devices(
        &self,
        page_token: Option<&str>,
        filter: &DeviceListFilter,
    ) -> Result<DevicePage, RegistryError>;

    /// A single device; `NotFound` when it does not exist.
    async fn get_device(&self, id: &DeviceId) -> Result<Device, RegistryError>;

    /// Create a device; `Conflict` when its ID is taken.
    async fn create_device(&self, device: &Device) -> Result<Device, RegistryError>;

    /// Overwrite the fields of `id` named by `mask` with those of `device`.
    async fn patch_device(
        &self,
        id: &DeviceId,
        device: &Device,
        mask: &UpdateMask,
    ) -> Result<Device, RegistryError>;

    async fn delete_device(&self, id: &DeviceId) -> Result<(), RegistryError>;

    /// Push a new cloud-to-device configuration.
    async fn modify_config(
        &self,
        id: &DeviceId,
        binary_data: &str,
    ) -> Result<DeviceConfig, RegistryError>;

    /// Every stored configuration version of a device, newest first.
    async fn list_config_versions(&self, id: &DeviceId)
        -> Result<Vec<DeviceConfig>, RegistryError>;

    async fn bind_device_to_gateway(
        &self,
        device_id: &DeviceId,
        gateway_id: &DeviceId,
    ) -> Result<(), RegistryError>;

    async fn unbind_device_from_gateway(
        &self,
        device_id: &DeviceId,
        gateway_id: &DeviceId,
    ) -> Result<(), RegistryError>;

    /// Store configuration history for many devices in one call.
    async fn update_config_history(&self, history: &ConfigHistory) -> Result<(), RegistryError>;

    /// Every device matching `filter`, following continuation tokens until
    /// the registry returns none.
    async fn list_all_devices(
        &self,
        filter: &DeviceListFilter,
    ) -> Result<Vec<Device>, RegistryError> {
        let mut devices = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self.list_devices(token.as_deref(), filter).await?;
            devices.extend(page.devices);
            match page.next_page_token {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => return Ok(devices),
            }
        }
    }

    /// Every device bound to `gateway_id`.
    async fn list_bound_devices(&self, gateway_id: &DeviceId) -> Result<Vec<Device>, RegistryError> {
        self.list_all_devices(&DeviceListFilter::bound_to(gateway_id))
            .await
    }
}
