//! # Migration Phases
//!
//! DEVICE_FETCH → DEVICE_MIGRATE → CONFIG_HISTORY → GATEWAY_BINDING → COMPLETE
//!
//! The derived `Ord` follows declaration order, which is the forward order
//! of the run. The checkpoint never moves the current phase backwards.

use serde::{Deserialize, Serialize};

/// The phase of a registry migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPhase {
    /// Listing or fetching devices from the source registry.
    DeviceFetch,
    /// Creating or updating devices in the destination registry.
    DeviceMigrate,
    /// Configuration history has been pushed.
    ConfigHistory,
    /// Rebuilding gateway bindings in the destination registry.
    GatewayBinding,
    /// All phases finished (terminal).
    Complete,
}

impl MigrationPhase {
    /// Every phase in forward order.
    pub const ALL: [MigrationPhase; 5] = [
        Self::DeviceFetch,
        Self::DeviceMigrate,
        Self::ConfigHistory,
        Self::GatewayBinding,
        Self::Complete,
    ];

    /// Whether this phase is terminal (no further transitions).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// The phase that follows this one, if any.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::DeviceFetch => Some(Self::DeviceMigrate),
            Self::DeviceMigrate => Some(Self::ConfigHistory),
            Self::ConfigHistory => Some(Self::GatewayBinding),
            Self::GatewayBinding => Some(Self::Complete),
            Self::Complete => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeviceFetch => "device_fetch",
            Self::DeviceMigrate => "device_migrate",
            Self::ConfigHistory => "config_history",
            Self::GatewayBinding => "gateway_binding",
            Self::Complete => "complete",
        }
    }
}

impl std::fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_matches_run_order() {
        let mut sorted = MigrationPhase::ALL;
        sorted.sort();
        assert_eq!(sorted, MigrationPhase::ALL);
    }

    #[test]
    fn next_walks_forward_to_terminal() {
        let mut phase = MigrationPhase::DeviceFetch;
        let mut seen = vec![phase];
        while let Some(next) = phase.next() {
            assert!(next > phase);
            phase = next;
            seen.push(phase);
        }
        assert!(phase.is_terminal());
        assert_eq!(seen, MigrationPhase::ALL.to_vec());
    }

    #[test]
    fn serde_names_match_display() {
        for phase in MigrationPhase::ALL {
            let json = serde_json::to_string(&phase).unwrap();
            assert_eq!(json, format!("\"{phase}\""));
        }
    }
}
