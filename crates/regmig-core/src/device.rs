//! # Device Data Model
//!
//! The device record exchanged with both registries, its configuration
//! versions, credentials, and gateway settings. Field names follow the
//! registries' camelCase JSON schema.
//!
//! Every optional field uses `#[serde(default)]`: registries omit unset
//! fields and may add new ones, so unknown fields are ignored and absent
//! fields default rather than failing the whole page.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::identity::DeviceId;

// ─── Gateway settings ───────────────────────────────────────────────

/// Whether a device relays traffic for other devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayType {
    /// Not reported by the registry.
    #[default]
    GatewayTypeUnspecified,
    /// The device is a gateway; other devices may be bound to it.
    Gateway,
    /// The device is not a gateway.
    NonGateway,
    /// Forward-compatible catch-all for values added after this release.
    #[serde(other)]
    Unknown,
}

/// Gateway-related fields of a device.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default)]
    pub gateway_type: GatewayType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_auth_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed_gateway_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed_gateway_time: Option<String>,
}

// ─── Credentials ────────────────────────────────────────────────────

/// A public key the device authenticates with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredential {
    /// Key format, e.g. `RSA_X509_PEM` or `ES256_PEM`.
    pub format: String,
    /// PEM-encoded key material.
    pub key: String,
}

/// One credential entry of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCredential {
    pub public_key: PublicKeyCredential,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<String>,
}

// ─── Configuration and state ────────────────────────────────────────

/// A configuration version of a device.
///
/// Used both for the device's current configuration and for each entry of
/// its version history. `binary_data` is base64 as delivered by the
/// registry; it is never decoded by the migration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    /// Version number. Registries send int64 values as JSON strings, some
    /// send plain numbers; both are accepted.
    #[serde(default, deserialize_with = "version_string")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_update_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_ack_time: Option<String>,
    #[serde(default)]
    pub binary_data: String,
}

/// The last state reported by the device.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
    #[serde(default)]
    pub binary_data: String,
}

/// The last error status reported for the device.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LastErrorStatus {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

fn version_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "config version must be a string or number, got {other}"
        ))),
    }
}

// ─── Device ─────────────────────────────────────────────────────────

/// A device identity as held by a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: DeviceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_id: Option<String>,
    #[serde(default)]
    pub credentials: Vec<DeviceCredential>,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<DeviceConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<DeviceState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_config: Option<GatewayConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_state_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_config_ack_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_config_send_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error_status: Option<LastErrorStatus>,
}

impl Device {
    /// A device with only its ID set.
    pub fn new(id: impl Into<DeviceId>) -> Self {
        Self {
            id: id.into(),
            name: None,
            num_id: None,
            credentials: Vec::new(),
            blocked: false,
            metadata: BTreeMap::new(),
            config: None,
            state: None,
            log_level: None,
            gateway_config: None,
            last_heartbeat_time: None,
            last_event_time: None,
            last_state_time: None,
            last_config_ack_time: None,
            last_config_send_time: None,
            last_error_time: None,
            last_error_status: None,
        }
    }

    /// Whether the registry reports this device as a gateway.
    pub fn is_gateway(&self) -> bool {
        self.gateway_config
            .as_ref()
            .is_some_and(|g| g.gateway_type == GatewayType::Gateway)
    }

    /// The binary data of the current configuration, if any.
    pub fn latest_config_data(&self) -> Option<&str> {
        self.config.as_ref().map(|c| c.binary_data.as_str())
    }

    /// Derive the record written to the destination registry.
    ///
    /// `name` is reset to the device ID (the destination computes its own
    /// resource name). Credentials are carried over only when
    /// `include_credentials` is set; everything else is copied unchanged.
    pub fn for_destination(&self, include_credentials: bool) -> Device {
        let mut out = self.clone();
        out.name = Some(self.id.0.clone());
        if !include_credentials {
            out.credentials.clear();
        }
        out
    }
}

/// Source gateway topology: gateway ID to the devices bound to it.
pub type GatewayBindings = BTreeMap<DeviceId, Vec<Device>>;

// ─── Update mask ────────────────────────────────────────────────────

/// Field paths a patch is allowed to overwrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateMask(Vec<&'static str>);

impl UpdateMask {
    /// The mask used when a device already exists in the destination.
    ///
    /// Always covers blocked, metadata, log level and gateway auth method;
    /// credentials are included only when public keys are being replaced.
    pub fn for_existing_device(update_public_keys: bool) -> Self {
        let mut paths = Vec::with_capacity(5);
        if update_public_keys {
            paths.push("credentials");
        }
        paths.extend(["blocked", "metadata", "logLevel", "gatewayConfig.gatewayAuthMethod"]);
        Self(paths)
    }

    /// The individual field paths.
    pub fn paths(&self) -> &[&'static str] {
        &self.0
    }

    /// Whether `path` is covered by the mask.
    pub fn contains(&self, path: &str) -> bool {
        self.0.iter().any(|p| *p == path)
    }
}

impl std::fmt::Display for UpdateMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.join(","))
    }
}
