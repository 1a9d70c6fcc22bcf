//! # regmig-client: Device Registry Client
//!
//! The contract the migration engine consumes from a device registry, and
//! two implementations of it.
//!
//! ## Architecture
//!
//! The engine only sees [`DeviceRegistry`]. Source and destination are two
//! independent instances of the same contract; nothing in the engine knows
//! whether it talks to a remote registry or to memory.
//!
//! - [`HttpRegistryClient`] speaks the registry's webhook API over reqwest.
//!   Transport failures are retried per the config's [`RetryPolicy`]; HTTP
//!   status codes are mapped to typed errors and never retried here.
//! - [`InMemoryRegistry`] holds devices, bindings and config history in a
//!   `parking_lot` lock, counts every operation by kind, and can inject
//!   failures for a given device. It backs the engine's scenario tests.
//!
//! ## Credentials
//!
//! A service-account file names a platform URL, a system key and a user
//! token. Per-registry credentials are resolved from it with
//! [`fetch_registry_credentials`], producing a [`RegistryConfig`] whose token
//! is zeroized on drop and redacted from `Debug` output.

pub mod config;
pub mod error;
pub mod http;
pub mod memory;
pub mod registry;
pub mod retry;

pub use config::{fetch_registry_credentials, ConfigError, RegistryConfig, ServiceAccount};
pub use error::RegistryError;
pub use http::HttpRegistryClient;
pub use memory::{InMemoryRegistry, OperationCounts, RegistryOp};
pub use registry::{ConfigHistory, DeviceListFilter, DevicePage, DeviceRegistry};
pub use retry::RetryPolicy;
