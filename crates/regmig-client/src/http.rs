//! # HTTP Registry Client
//!
//! [`DeviceRegistry`] over the registry's webhook API.
//!
//! ## Endpoints
//!
//! | Operation | Method | Resource |
//! |-----------|--------|----------|
//! | list / get / create / patch / delete | GET / GET / POST / PATCH / DELETE | `cloudiot_devices` |
//! | modify config | POST `method=modifyCloudToDeviceConfig` | `cloudiot_devices` |
//! | config versions | GET | `cloudiot_devices_configVersions` |
//! | bind / unbind | POST `method=bindDeviceToGateway` / `unbindDeviceFromGateway` | `cloudiot` |
//! | config history | POST | code service `devicesConfigHistoryUpdate` |
//!
//! Every request carries the registry token in the `ClearBlade-UserToken`
//! header. Transport errors are retried; status codes are mapped by
//! [`RegistryError::from_status`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use regmig_core::{Device, DeviceConfig, DeviceId, UpdateMask};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, RegistryConfig, TOKEN_HEADER};
use crate::error::RegistryError;
use crate::registry::{ConfigHistory, DeviceListFilter, DevicePage, DeviceRegistry};

const DEVICES: &str = "cloudiot_devices";
const CONFIG_VERSIONS: &str = "cloudiot_devices_configVersions";
const REGISTRY: &str = "cloudiot";
const CONFIG_HISTORY_SERVICE: &str = "devicesConfigHistoryUpdate";

// ─── Wire types ─────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDevicesResponse {
    #[serde(default)]
    devices: Vec<Device>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListConfigVersionsResponse {
    #[serde(default)]
    device_configs: Vec<DeviceConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ModifyConfigRequest<'a> {
    version_to_update: &'a str,
    binary_data: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BindingRequest<'a> {
    device_id: &'a str,
    gateway_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryEntry<'a> {
    cloud_update_time: &'a str,
    device_ack_time: &'a str,
    binary_data: &'a str,
}

/// `{"configs": {deviceId: {version: entry}}}`
#[derive(Serialize)]
struct HistoryUpdateRequest<'a> {
    configs: BTreeMap<&'a str, BTreeMap<&'a str, HistoryEntry<'a>>>,
}

impl<'a> HistoryUpdateRequest<'a> {
    fn new(history: &'a ConfigHistory) -> Self {
        let configs = history
            .iter()
            .map(|(id, versions)| {
                let entries = versions
                    .iter()
                    .map(|cfg| {
                        (
                            cfg.version.as_str(),
                            HistoryEntry {
                                cloud_update_time: cfg.cloud_update_time.as_deref().unwrap_or(""),
                                device_ack_time: cfg.device_ack_time.as_deref().unwrap_or(""),
                                binary_data: &cfg.binary_data,
                            },
                        )
                    })
                    .collect();
                (id.as_str(), entries)
            })
            .collect();
        Self { configs }
    }
}

// ─── Client ─────────────────────────────────────────────────────────

/// Registry client over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRegistryClient {
    http: reqwest::Client,
    config: RegistryConfig,
}

impl HttpRegistryClient {
    /// Build a client from resolved registry configuration.
    pub fn new(config: RegistryConfig) -> Result<Self, RegistryError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::HeaderName::from_static(TOKEN_HEADER),
                    reqwest::header::HeaderValue::from_str(config.token.as_str())
                        .map_err(|_| RegistryError::Config(ConfigError::InvalidToken))?,
                );
                headers.insert(
                    reqwest::header::CONTENT_TYPE,
                    reqwest::header::HeaderValue::from_static("application/json"),
                );
                headers
            })
            .build()
            .map_err(|e| RegistryError::Http {
                endpoint: "client builder".into(),
                source: e,
            })?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn registry_path(&self) -> String {
        self.config.registry.registry_path()
    }

    fn device_path(&self, id: &DeviceId) -> String {
        format!("{}/devices/{id}", self.registry_path())
    }

    /// Send with transport retry and map non-2xx statuses to errors.
    async fn send<F>(&self, endpoint: &str, build: F) -> Result<reqwest::Response, RegistryError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let resp = self
            .config
            .retry
            .send(endpoint, || build().send())
            .await
            .map_err(|e| RegistryError::Http {
                endpoint: endpoint.into(),
                source: e,
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            tracing::debug!(endpoint, status, "registry request failed");
            return Err(RegistryError::from_status(endpoint, status, body));
        }
        Ok(resp)
    }

    async fn decode<T: DeserializeOwned>(
        endpoint: &str,
        resp: reqwest::Response,
    ) -> Result<T, RegistryError> {
        resp.json().await.map_err(|e| RegistryError::Deserialization {
            endpoint: endpoint.into(),
            source: e,
        })
    }

    async fn binding_call(
        &self,
        method: &str,
        device_id: &DeviceId,
        gateway_id: &DeviceId,
    ) -> Result<(), RegistryError> {
        let endpoint = format!("POST {method} {device_id} -> {gateway_id}");
        let url = self.config.webhook_url(REGISTRY);
        let parent = self.registry_path();
        let body = BindingRequest {
            device_id: device_id.as_str(),
            gateway_id: gateway_id.as_str(),
        };
        self.send(&endpoint, || {
            self.http
                .post(&url)
                .query(&[("parent", parent.as_str()), ("method", method)])
                .json(&body)
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl DeviceRegistry for HttpRegistryClient {
    async fn list_devices(
        &self,
        page_token: Option<&str>,
        filter: &DeviceListFilter,
    ) -> Result<DevicePage, RegistryError> {
        let endpoint = "GET cloudiot_devices (list)";
        let url = self.config.webhook_url(DEVICES);
        let mut query: Vec<(&str, String)> = vec![
            ("parent", self.registry_path()),
            ("pageSize", self.config.page_size.to_string()),
        ];
        if let Some(token) = page_token.filter(|t| !t.is_empty()) {
            query.push(("pageToken", token.to_string()));
        }
        if let Some(gateway) = &filter.associations_gateway_id {
            query.push((
                "gatewayListOptions.associationsGatewayId",
                gateway.to_string(),
            ));
        }
        if filter.gateways_only {
            query.push(("gatewayListOptions.gatewayType", "GATEWAY".to_string()));
        }

        let resp = self
            .send(endpoint, || self.http.get(&url).query(&query))
            .await?;
        let page: ListDevicesResponse = Self::decode(endpoint, resp).await?;
        Ok(DevicePage {
            devices: page.devices,
            next_page_token: page.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn get_device(&self, id: &DeviceId) -> Result<Device, RegistryError> {
        let endpoint = format!("GET device {id}");
        let url = self.config.webhook_url(DEVICES);
        let name = self.device_path(id);
        let resp = self
            .send(&endpoint, || self.http.get(&url).query(&[("name", name.as_str())]))
            .await?;
        Self::decode(&endpoint, resp).await
    }

    async fn create_device(&self, device: &Device) -> Result<Device, RegistryError> {
        let endpoint = format!("POST device {}", device.id);
        let url = self.config.webhook_url(DEVICES);
        let parent = self.registry_path();
        let resp = self
            .send(&endpoint, || {
                self.http
                    .post(&url)
                    .query(&[("parent", parent.as_str())])
                    .json(device)
            })
            .await?;
        Self::decode(&endpoint, resp).await
    }

    async fn patch_device(
        &self,
        id: &DeviceId,
        device: &Device,
        mask: &UpdateMask,
    ) -> Result<Device, RegistryError> {
        let endpoint = format!("PATCH device {id}");
        let url = self.config.webhook_url(DEVICES);
        let name = self.device_path(id);
        let update_mask = mask.to_string();
        let resp = self
            .send(&endpoint, || {
                self.http
                    .patch(&url)
                    .query(&[("name", name.as_str()), ("updateMask", update_mask.as_str())])
                    .json(device)
            })
            .await?;
        Self::decode(&endpoint, resp).await
    }

    async fn delete_device(&self, id: &DeviceId) -> Result<(), RegistryError> {
        let endpoint = format!("DELETE device {id}");
        let url = self.config.webhook_url(DEVICES);
        let name = self.device_path(id);
        self.send(&endpoint, || {
            self.http.delete(&url).query(&[("name", name.as_str())])
        })
        .await?;
        Ok(())
    }

    async fn modify_config(
        &self,
        id: &DeviceId,
        binary_data: &str,
    ) -> Result<DeviceConfig, RegistryError> {
        let endpoint = format!("POST modifyCloudToDeviceConfig {id}");
        let url = self.config.webhook_url(DEVICES);
        let name = self.device_path(id);
        let body = ModifyConfigRequest {
            version_to_update: "0",
            binary_data,
        };
        let resp = self
            .send(&endpoint, || {
                self.http
                    .post(&url)
                    .query(&[
                        ("name", name.as_str()),
                        ("method", "modifyCloudToDeviceConfig"),
                    ])
                    .json(&body)
            })
            .await?;
        Self::decode(&endpoint, resp).await
    }

    async fn list_config_versions(
        &self,
        id: &DeviceId,
    ) -> Result<Vec<DeviceConfig>, RegistryError> {
        let endpoint = format!("GET configVersions {id}");
        let url = self.config.webhook_url(CONFIG_VERSIONS);
        let name = self.device_path(id);
        let resp = self
            .send(&endpoint, || {
                self.http
                    .get(&url)
                    .query(&[("name", name.as_str()), ("numVersions", "0")])
            })
            .await?;
        let versions: ListConfigVersionsResponse = Self::decode(&endpoint, resp).await?;
        Ok(versions.device_configs)
    }

    async fn bind_device_to_gateway(
        &self,
        device_id: &DeviceId,
        gateway_id: &DeviceId,
    ) -> Result<(), RegistryError> {
        self.binding_call("bindDeviceToGateway", device_id, gateway_id)
            .await
    }

    async fn unbind_device_from_gateway(
        &self,
        device_id: &DeviceId,
        gateway_id: &DeviceId,
    ) -> Result<(), RegistryError> {
        self.binding_call("unbindDeviceFromGateway", device_id, gateway_id)
            .await
    }

    async fn update_config_history(&self, history: &ConfigHistory) -> Result<(), RegistryError> {
        let endpoint = "POST devicesConfigHistoryUpdate";
        let url = self.config.code_url(CONFIG_HISTORY_SERVICE);
        let body = HistoryUpdateRequest::new(history);
        let resp = self
            .send(endpoint, || self.http.post(&url).json(&body))
            .await?;

        let text = resp.text().await.map_err(|e| RegistryError::Http {
            endpoint: endpoint.into(),
            source: e,
        })?;
        let value: serde_json::Value =
            serde_json::from_str(&text).map_err(|_| RegistryError::Rejected {
                endpoint: endpoint.into(),
                reason: text.clone(),
            })?;
        if value.get("error").is_some_and(|e| !e.is_null()) {
            return Err(RegistryError::Rejected {
                endpoint: endpoint.into(),
                reason: text,
            });
        }
        Ok(())
    }
}
