//! Registry client configuration.
//!
//! A [`ServiceAccount`] is loaded from the operator's JSON file and is only
//! used to resolve per-registry credentials. A [`RegistryConfig`] is what a
//! [`crate::HttpRegistryClient`] is built from: the resolved platform URL,
//! system key, token and registry coordinates.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regmig_core::RegistryCoordinates;
use serde::{Deserialize, Serialize};
use url::Url;
use zeroize::Zeroizing;

use crate::error::RegistryError;
use crate::retry::RetryPolicy;

/// Header carrying the user token on every registry request
/// (`ClearBlade-UserToken`; header names are case-insensitive).
pub const TOKEN_HEADER: &str = "clearblade-usertoken";

/// Default request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default page size for list operations.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

// ─── Service account ────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawServiceAccount {
    #[serde(default)]
    system_key: String,
    #[serde(default)]
    token: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    project: String,
}

/// The platform credentials an operator downloads for a project.
///
/// Custom `Debug` implementation redacts the `token` field.
#[derive(Clone)]
pub struct ServiceAccount {
    pub system_key: String,
    pub token: Zeroizing<String>,
    pub url: Url,
    pub project: String,
}

impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("system_key", &self.system_key)
            .field("token", &"[REDACTED]")
            .field("url", &self.url.as_str())
            .field("project", &self.project)
            .finish()
    }
}

impl ServiceAccount {
    /// Load a service-account JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw).map_err(|e| match e {
            ConfigError::Parse { reason, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse a service-account JSON document.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let raw: RawServiceAccount =
            serde_json::from_str(raw).map_err(|e| ConfigError::Parse {
                path: PathBuf::new(),
                reason: e.to_string(),
            })?;
        let token = Zeroizing::new(raw.token);
        if raw.system_key.is_empty() {
            return Err(ConfigError::MissingField("systemKey"));
        }
        if token.is_empty() {
            return Err(ConfigError::MissingField("token"));
        }
        if raw.project.is_empty() {
            return Err(ConfigError::MissingField("project"));
        }
        let url = parse_url("url", &raw.url)?;
        Ok(Self {
            system_key: raw.system_key,
            token,
            url,
            project: raw.project,
        })
    }
}

// ─── Registry config ────────────────────────────────────────────────

/// Resolved connection settings for one registry.
///
/// Custom `Debug` implementation redacts the `token` field
/// to prevent credential leakage in log output.
#[derive(Clone)]
pub struct RegistryConfig {
    /// Platform base URL, e.g. `https://iot.example.com`.
    pub base_url: Url,
    /// System key of the registry's backing system.
    pub system_key: String,
    /// Registry service-account token.
    pub token: Zeroizing<String>,
    /// Which registry this is.
    pub registry: RegistryCoordinates,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Devices requested per list page.
    pub page_size: u32,
    /// Transport retry for every request to this registry.
    pub retry: RetryPolicy,
}

impl std::fmt::Debug for RegistryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryConfig")
            .field("base_url", &self.base_url.as_str())
            .field("system_key", &self.system_key)
            .field("token", &"[REDACTED]")
            .field("registry", &self.registry)
            .field("timeout_secs", &self.timeout_secs)
            .field("page_size", &self.page_size)
            .field("retry", &self.retry)
            .finish()
    }
}

impl RegistryConfig {
    /// A configuration pointing at a local mock server (for testing).
    pub fn local_mock(uri: &str, registry: RegistryCoordinates) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_url("mock", uri)?,
            system_key: "mock-system".into(),
            token: Zeroizing::new("mock-token".into()),
            registry,
            timeout_secs: 5,
            page_size: DEFAULT_PAGE_SIZE,
            retry: RetryPolicy::none(),
        })
    }

    /// `{url}/api/v/4/webhook/execute/{systemKey}/{resource}`
    pub fn webhook_url(&self, resource: &str) -> String {
        format!(
            "{}/api/v/4/webhook/execute/{}/{resource}",
            trimmed(&self.base_url),
            self.system_key
        )
    }

    /// `{url}/api/v/1/code/{systemKey}/{service}`
    pub fn code_url(&self, service: &str) -> String {
        code_url(&self.base_url, &self.system_key, service)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Override the list page size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }
}

fn trimmed(url: &Url) -> &str {
    url.as_str().trim_end_matches('/')
}

fn code_url(base: &Url, system_key: &str, service: &str) -> String {
    format!("{}/api/v/1/code/{system_key}/{service}", trimmed(base))
}

fn parse_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::InvalidUrl(field.to_string(), e.to_string()))
}

// ─── Credential resolution ──────────────────────────────────────────

#[derive(Serialize)]
struct CredentialsRequest<'a> {
    project: &'a str,
    region: &'a str,
    registry: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialsResponse {
    #[serde(default)]
    system_key: String,
    #[serde(default)]
    service_account_token: String,
    #[serde(default)]
    url: String,
}

/// Resolve the credentials of one registry from a service account.
///
/// Calls `POST {url}/api/v/1/code/{systemKey}/getRegistryCredentials` with
/// the registry coordinates. A response without a system key means the
/// registry does not exist in the account's project. `retry` governs this
/// call and is carried into the returned config.
pub async fn fetch_registry_credentials(
    account: &ServiceAccount,
    registry: &RegistryCoordinates,
    timeout_secs: u64,
    retry: RetryPolicy,
) -> Result<RegistryConfig, RegistryError> {
    let endpoint = "POST getRegistryCredentials";
    let url = code_url(&account.url, &account.system_key, "getRegistryCredentials");
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| RegistryError::Http {
            endpoint: endpoint.into(),
            source: e,
        })?;
    let body = CredentialsRequest {
        project: &registry.project,
        region: &registry.region,
        registry: &registry.registry,
    };

    let resp = retry
        .send(endpoint, || {
            http.post(&url)
                .header(TOKEN_HEADER, account.token.as_str())
                .json(&body)
                .send()
        })
        .await
    .map_err(|e| RegistryError::Http {
        endpoint: endpoint.into(),
        source: e,
    })?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        return Err(RegistryError::from_status(endpoint, status, body));
    }

    let creds: CredentialsResponse =
        resp.json()
            .await
            .map_err(|e| RegistryError::Deserialization {
                endpoint: endpoint.into(),
                source: e,
            })?;

    if creds.system_key.is_empty() {
        return Err(ConfigError::RegistryNotFound {
            registry: registry.registry.clone(),
            region: registry.region.clone(),
        }
        .into());
    }

    let base_url = if creds.url.is_empty() {
        account.url.clone()
    } else {
        parse_url("registry url", &creds.url)?
    };

    tracing::info!(registry = %registry.registry, "fetched registry credentials");

    Ok(RegistryConfig {
        base_url,
        system_key: creds.system_key,
        token: Zeroizing::new(creds.service_account_token),
        registry: registry.clone(),
        timeout_secs,
        page_size: DEFAULT_PAGE_SIZE,
        retry,
    })
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },
    #[error("service account is missing required field {0}")]
    MissingField(&'static str),
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    #[error("registry {registry} not found in region {region}")]
    RegistryNotFound { registry: String, region: String },
    #[error("token contains characters not allowed in an HTTP header")]
    InvalidToken,
}
