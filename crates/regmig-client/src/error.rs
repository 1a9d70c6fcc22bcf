//! Registry client error types.

/// Errors from registry calls.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The registry reported the resource does not exist (HTTP 404).
    #[error("{endpoint}: not found")]
    NotFound { endpoint: String },
    /// The resource already exists (HTTP 409).
    #[error("{endpoint}: already exists: {body}")]
    Conflict { endpoint: String, body: String },
    /// The registry returned any other non-2xx status.
    #[error("registry {endpoint} returned {status}: {body}")]
    Api {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// HTTP transport error, after retries.
    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        endpoint: String,
        source: reqwest::Error,
    },
    /// Response deserialization failed.
    #[error("failed to deserialize response from {endpoint}: {source}")]
    Deserialization {
        endpoint: String,
        source: reqwest::Error,
    },
    /// A 2xx response whose body reports failure.
    #[error("{endpoint} rejected the request: {reason}")]
    Rejected { endpoint: String, reason: String },
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),
}

impl RegistryError {
    /// Whether the registry reported the resource as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether the registry reported the resource as already existing.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Map a non-2xx status and body to the matching variant.
    pub(crate) fn from_status(endpoint: impl Into<String>, status: u16, body: String) -> Self {
        let endpoint = endpoint.into();
        match status {
            404 => Self::NotFound { endpoint },
            409 => Self::Conflict { endpoint, body },
            _ => Self::Api {
                endpoint,
                status,
                body,
            },
        }
    }
}
