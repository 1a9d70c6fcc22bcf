//! Error types for the foundational crate.

use thiserror::Error;

/// Errors raised while constructing core domain values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A device identifier failed validation.
    #[error("invalid device id {id:?}: {reason}")]
    InvalidDeviceId {
        /// The rejected input.
        id: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A run argument is out of range or inconsistent.
    #[error("invalid argument {name}: {reason}")]
    InvalidArgument {
        /// Argument name as the operator spells it.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}
