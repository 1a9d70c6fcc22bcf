//! # Run Arguments
//!
//! The explicit configuration of one migration run. Built once by the
//! binary, passed by reference into every component, and snapshotted into
//! the checkpoint so a resumed run can tell whether it was started with
//! different arguments.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Default number of concurrent workers per phase.
pub const DEFAULT_WORKERS: usize = 25;

/// Default page size for list operations.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Where a registry lives.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegistryCoordinates {
    pub project: String,
    pub region: String,
    pub registry: String,
}

impl RegistryCoordinates {
    /// The registry resource path:
    /// `projects/{project}/locations/{region}/registries/{registry}`.
    pub fn registry_path(&self) -> String {
        format!(
            "projects/{}/locations/{}/registries/{}",
            self.project, self.region, self.registry
        )
    }
}

/// Arguments of a migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationArgs {
    /// The registry devices are read from.
    pub source: RegistryCoordinates,
    /// The registry devices are written to. `None` in export mode.
    #[serde(default)]
    pub destination: Option<RegistryCoordinates>,
    /// Optional CSV restricting the run to the listed device IDs.
    #[serde(default)]
    pub devices_csv: Option<PathBuf>,
    /// Fetch and push each device's configuration version history.
    pub config_history: bool,
    /// Carry credentials over and overwrite them on existing devices.
    pub update_public_keys: bool,
    /// Do not push the latest configuration to devices that already exist.
    pub skip_config: bool,
    /// Empty the destination registry before migrating.
    pub cleanup_destination: bool,
    /// When non-zero, export device ID batches of this size instead of migrating.
    pub export_batch_size: usize,
    /// Directory holding the checkpoint file and exported batches.
    pub work_dir: PathBuf,
    /// Concurrent workers per phase.
    pub workers: usize,
    /// Page size for list operations.
    pub page_size: u32,
}

impl Default for MigrationArgs {
    fn default() -> Self {
        Self {
            source: RegistryCoordinates::default(),
            destination: None,
            devices_csv: None,
            config_history: true,
            update_public_keys: true,
            skip_config: false,
            cleanup_destination: false,
            export_batch_size: 0,
            work_dir: PathBuf::from("."),
            workers: DEFAULT_WORKERS,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl MigrationArgs {
    /// Whether this run exports batches instead of migrating.
    pub fn is_export(&self) -> bool {
        self.export_batch_size > 0
    }

    /// Reject argument combinations no run can execute.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.workers == 0 {
            return Err(CoreError::InvalidArgument {
                name: "workers",
                reason: "must be at least 1".into(),
            });
        }
        if self.page_size == 0 {
            return Err(CoreError::InvalidArgument {
                name: "page-size",
                reason: "must be at least 1".into(),
            });
        }
        if self.source.registry.is_empty() || self.source.region.is_empty() {
            return Err(CoreError::InvalidArgument {
                name: "source-registry",
                reason: "source registry name and region are required".into(),
            });
        }
        if !self.is_export() && self.destination.is_none() {
            return Err(CoreError::InvalidArgument {
                name: "registry",
                reason: "a destination registry is required unless exporting".into(),
            });
        }
        Ok(())
    }

    /// Names of the arguments that differ from `other`.
    ///
    /// Only arguments that change which devices are selected or how they are
    /// written are compared; concurrency and paging settings may change
    /// freely between a run and its resumption.
    pub fn differences(&self, other: &MigrationArgs) -> Vec<&'static str> {
        let mut diff = Vec::new();
        if self.source != other.source {
            diff.push("source");
        }
        if self.destination != other.destination {
            diff.push("destination");
        }
        if self.devices_csv != other.devices_csv {
            diff.push("devices_csv");
        }
        if self.config_history != other.config_history {
            diff.push("config_history");
        }
        if self.update_public_keys != other.update_public_keys {
            diff.push("update_public_keys");
        }
        if self.skip_config != other.skip_config {
            diff.push("skip_config");
        }
        if self.export_batch_size != other.export_batch_size {
            diff.push("export_batch_size");
        }
        diff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coords(registry: &str) -> RegistryCoordinates {
        RegistryCoordinates {
            project: "acme".into(),
            region: "us-central1".into(),
            registry: registry.into(),
        }
    }

    fn migrate_args() -> MigrationArgs {
        MigrationArgs {
            source: coords("src"),
            destination: Some(coords("dst")),
            ..MigrationArgs::default()
        }
    }

    #[test]
    fn registry_path_format() {
        assert_eq!(
            coords("fleet").registry_path(),
            "projects/acme/locations/us-central1/registries/fleet"
        );
    }

    #[test]
    fn defaults_match_operator_expectations() {
        let args = MigrationArgs::default();
        assert!(args.config_history);
        assert!(args.update_public_keys);
        assert!(!args.skip_config);
        assert_eq!(args.workers, DEFAULT_WORKERS);
        assert!(!args.is_export());
    }

    #[test]
    fn validate_accepts_complete_migration() {
        assert!(migrate_args().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let args = MigrationArgs {
            workers: 0,
            ..migrate_args()
        };
        assert!(args.validate().is_err());
    }

    #[test]
    fn validate_requires_destination_unless_exporting() {
        let mut args = MigrationArgs {
            destination: None,
            ..migrate_args()
        };
        assert!(args.validate().is_err());
        args.export_batch_size = 100;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn differences_ignore_tuning_knobs() {
        let a = migrate_args();
        let b = MigrationArgs {
            workers: 4,
            page_size: 10,
            ..migrate_args()
        };
        assert!(a.differences(&b).is_empty());

        let c = MigrationArgs {
            skip_config: true,
            devices_csv: Some("ids.csv".into()),
            ..migrate_args()
        };
        assert_eq!(a.differences(&c), vec!["devices_csv", "skip_config"]);
    }

    #[test]
    fn round_trips_through_json() {
        let args = migrate_args();
        let json = serde_json::to_string(&args).unwrap();
        let back: MigrationArgs = serde_json::from_str(&json).unwrap();
        assert_eq!(args, back);
    }
}
