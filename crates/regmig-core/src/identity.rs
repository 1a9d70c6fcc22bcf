//! # Device Identity Newtype
//!
//! Registries address devices (and gateways, which are devices) by a
//! string ID that is unique within a registry. The same ID names the
//! device in both the source and the destination registry; that is the
//! only identifier the two registries share.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Identifier of a device or gateway within a registry.
///
/// Serializes as a bare JSON string so it can be used directly as a JSON
/// object key in the checkpoint file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    /// Wrap a string without validation.
    ///
    /// Use [`DeviceId::parse`] for operator-supplied input.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Validate and wrap operator-supplied input.
    ///
    /// Surrounding whitespace is trimmed. Empty IDs and IDs containing `/`
    /// are rejected because they cannot be embedded in a device path.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let id = raw.trim();
        if id.is_empty() {
            return Err(CoreError::InvalidDeviceId {
                id: raw.to_string(),
                reason: "must not be empty",
            });
        }
        if id.contains('/') {
            return Err(CoreError::InvalidDeviceId {
                id: raw.to_string(),
                reason: "must not contain '/'",
            });
        }
        Ok(Self(id.to_string()))
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_trims_whitespace() {
        let id = DeviceId::parse("  sensor-01\r").unwrap();
        assert_eq!(id.as_str(), "sensor-01");
    }

    #[test]
    fn parse_rejects_empty() {
        assert!(DeviceId::parse("   ").is_err());
    }

    #[test]
    fn parse_rejects_path_separator() {
        let err = DeviceId::parse("a/b").unwrap_err();
        assert!(err.to_string().contains("'/'"));
    }

    #[test]
    fn serializes_as_bare_string() {
        let id = DeviceId::new("gw-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"gw-1\"");
    }

    #[test]
    fn ordering_is_lexicographic() {
        let mut ids = vec![DeviceId::new("b"), DeviceId::new("a"), DeviceId::new("c")];
        ids.sort();
        assert_eq!(ids, vec![DeviceId::new("a"), DeviceId::new("b"), DeviceId::new("c")]);
    }

    proptest! {
        #[test]
        fn parsed_ids_are_embeddable_and_stable(raw in "\\PC{0,24}") {
            match DeviceId::parse(&raw) {
                Ok(id) => {
                    prop_assert!(!id.as_str().is_empty());
                    prop_assert!(!id.as_str().contains('/'));
                    prop_assert_eq!(id.as_str(), id.as_str().trim());
                    prop_assert_eq!(DeviceId::parse(id.as_str()).unwrap(), id);
                }
                Err(_) => {
                    let trimmed = raw.trim();
                    prop_assert!(trimmed.is_empty() || trimmed.contains('/'));
                }
            }
        }

        #[test]
        fn surrounding_whitespace_is_ignored(raw in "[a-z0-9/_-]{0,16}") {
            let padded = format!(" \t{raw}\r\n");
            prop_assert_eq!(
                DeviceId::parse(&padded).ok(),
                DeviceId::parse(&raw).ok()
            );
        }
    }
}
