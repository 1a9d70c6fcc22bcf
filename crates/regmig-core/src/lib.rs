//! # regmig-core: Foundational Types for Registry Migration
//!
//! Defines the data model shared by every crate in the workspace: the
//! device identity as it travels between a source and a destination
//! registry, its configuration history, the gateway binding topology, and
//! the explicit run configuration.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype identifiers.** Device and gateway identifiers are
//!    [`DeviceId`], never bare strings, so a gateway ID cannot be passed
//!    where a registry name is expected.
//!
//! 2. **Source copies are read-only.** The destination record is derived by
//!    [`Device::for_destination`], which returns a new value. Nothing in
//!    the engine mutates a fetched device in place.
//!
//! 3. **Explicit configuration.** [`MigrationArgs`] is built once at startup
//!    and passed by parameter. There is no global argument state.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `regmig-*` crates (this is the leaf of the DAG).
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod args;
pub mod device;
pub mod error;
pub mod identity;

pub use args::{MigrationArgs, RegistryCoordinates};
pub use device::{
    Device, DeviceConfig, DeviceCredential, DeviceState, GatewayBindings, GatewayConfig,
    GatewayType, LastErrorStatus, PublicKeyCredential, UpdateMask,
};
pub use error::CoreError;
pub use identity::DeviceId;
