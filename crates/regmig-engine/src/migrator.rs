//! # Migration Phase Sequencer
//!
//! Drives one run through the checkpointed phases:
//!
//! | Phase | Work | Advances when |
//! |-------|------|---------------|
//! | `device_fetch` | list or fetch source devices | every requested device is recorded |
//! | `device_migrate` | capture config history, upsert devices | every device is migrated |
//! | `config_history` | push captured history to the destination | always (failure is recorded) |
//! | `gateway_binding` | fetch source bindings, reconcile | every gateway is processed |
//! | `complete` | checkpoint file deleted | |
//!
//! A phase that leaves work behind ends the run as
//! [`MigrationOutcome::Incomplete`]: later phases are not started, the
//! checkpoint is kept, and the next run resumes from it.

use std::path::PathBuf;
use std::sync::Arc;

use regmig_client::DeviceRegistry;
use regmig_core::MigrationArgs;
use regmig_state::{CheckpointStore, MigrationPhase};

use crate::cleanup::cleanup_destination;
use crate::error::EngineError;
use crate::export::export_batches;
use crate::fetch::{fetch_config_history, fetch_devices, fetch_gateway_bindings};
use crate::gateway::reconcile_gateways;
use crate::report::ErrorAggregator;
use crate::upsert::{migrate_devices, push_config_history};

/// Whether a phase driver finished its phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseStatus {
    Complete,
    Incomplete,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Every phase finished and the checkpoint was removed.
    Completed,
    /// `phase` left work behind; a resumed run picks it up.
    Incomplete { phase: MigrationPhase },
}

/// Result of [`Migrator::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSummary {
    /// Whether the checkpoint of a previous run was loaded.
    pub resumed: bool,
    pub fetched: usize,
    pub migrated: usize,
    /// Devices created in this run.
    pub created: usize,
    /// Existing devices updated in this run.
    pub updated: usize,
    pub gateways_processed: usize,
    pub error_count: usize,
    /// Failed-devices report, when anything failed.
    pub report_path: Option<PathBuf>,
    /// Batch files written in export mode.
    pub exported: Vec<PathBuf>,
    pub outcome: MigrationOutcome,
}

impl MigrationSummary {
    pub fn is_complete(&self) -> bool {
        self.outcome == MigrationOutcome::Completed
    }
}

#[derive(Default)]
struct RunCounts {
    created: usize,
    updated: usize,
    exported: Vec<PathBuf>,
}

/// One migration run between a source and an optional destination.
pub struct Migrator {
    args: MigrationArgs,
    source: Arc<dyn DeviceRegistry>,
    destination: Option<Arc<dyn DeviceRegistry>>,
    report_dir: Option<PathBuf>,
}

impl Migrator {
    pub fn new(args: MigrationArgs, source: Arc<dyn DeviceRegistry>) -> Self {
        Self {
            args,
            source,
            destination: None,
            report_dir: None,
        }
    }

    /// Set the registry devices are written to. Not needed in export mode.
    pub fn with_destination(mut self, destination: Arc<dyn DeviceRegistry>) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Directory for the failed-devices report. Defaults to the work dir.
    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = Some(dir.into());
        self
    }

    pub fn args(&self) -> &MigrationArgs {
        &self.args
    }

    /// Run every phase not yet complete.
    ///
    /// Setup and phase-level failures return `Err` after the error report
    /// has been written. Item-level failures end up in the summary.
    pub async fn run(&self) -> Result<MigrationSummary, EngineError> {
        self.args.validate()?;
        let destination = match (&self.destination, self.args.is_export()) {
            (_, true) => None,
            (Some(d), false) => Some(Arc::clone(d)),
            (None, false) => return Err(EngineError::MissingDestination),
        };

        if self.args.is_export() {
            self.ensure_exportable()?;
        }
        let (store, resumed) = CheckpointStore::open(&self.args.work_dir, &self.args)?;
        let checkpoint = Arc::new(store);
        let errors = Arc::new(ErrorAggregator::new());
        let mut counts = RunCounts::default();

        let result = match &destination {
            None => self.export(&checkpoint, &errors, &mut counts).await,
            Some(dest) => self.migrate(dest, &checkpoint, &errors, &mut counts).await,
        };

        let report_dir = self.report_dir.as_ref().unwrap_or(&self.args.work_dir);
        let report_path = errors.write_report(report_dir)?;
        let outcome = result?;

        let progress = checkpoint.progress();
        let summary = MigrationSummary {
            resumed,
            fetched: progress.fetched,
            migrated: progress.migrated,
            created: counts.created,
            updated: counts.updated,
            gateways_processed: progress.gateways_processed,
            error_count: errors.len(),
            report_path,
            exported: counts.exported,
            outcome,
        };
        match summary.outcome {
            MigrationOutcome::Completed => tracing::info!(
                fetched = summary.fetched,
                migrated = summary.migrated,
                created = summary.created,
                updated = summary.updated,
                gateways = summary.gateways_processed,
                errors = summary.error_count,
                "migration complete"
            ),
            MigrationOutcome::Incomplete { phase } => tracing::warn!(
                %phase,
                migrated = summary.migrated,
                errors = summary.error_count,
                checkpoint = %checkpoint.path().display(),
                "migration incomplete, run again to resume"
            ),
        }
        Ok(summary)
    }

    /// Export completes and deletes its checkpoint, so it must not adopt one
    /// left behind by a migration run.
    fn ensure_exportable(&self) -> Result<(), EngineError> {
        let Some(state) = CheckpointStore::load(&self.args.work_dir)? else {
            return Ok(());
        };
        let from_migration = state.args.as_ref().map_or(true, |a| !a.is_export())
            || !state.devices_migrated.is_empty();
        if from_migration {
            return Err(EngineError::CheckpointInUse {
                path: CheckpointStore::path_in(&self.args.work_dir),
            });
        }
        Ok(())
    }

    async fn export(
        &self,
        checkpoint: &Arc<CheckpointStore>,
        errors: &Arc<ErrorAggregator>,
        counts: &mut RunCounts,
    ) -> Result<MigrationOutcome, EngineError> {
        let (devices, status) = fetch_devices(&self.source, checkpoint, errors, &self.args).await?;
        if status == PhaseStatus::Incomplete {
            return Ok(MigrationOutcome::Incomplete {
                phase: MigrationPhase::DeviceFetch,
            });
        }
        counts.exported =
            export_batches(&devices, &self.args.work_dir, self.args.export_batch_size)?;
        checkpoint.complete()?;
        Ok(MigrationOutcome::Completed)
    }

    async fn migrate(
        &self,
        destination: &Arc<dyn DeviceRegistry>,
        checkpoint: &Arc<CheckpointStore>,
        errors: &Arc<ErrorAggregator>,
        counts: &mut RunCounts,
    ) -> Result<MigrationOutcome, EngineError> {
        let args = &self.args;

        if args.cleanup_destination {
            if checkpoint.migrated_count() > 0 {
                tracing::warn!(
                    migrated = checkpoint.migrated_count(),
                    "checkpoint already records migrated devices, skipping destination cleanup"
                );
            } else {
                cleanup_destination(destination, args.workers).await?;
            }
        }

        let (devices, status) = fetch_devices(&self.source, checkpoint, errors, args).await?;
        if status == PhaseStatus::Incomplete {
            return Ok(MigrationOutcome::Incomplete {
                phase: MigrationPhase::DeviceFetch,
            });
        }

        if !checkpoint.is_phase_completed(MigrationPhase::DeviceMigrate) {
            if args.config_history {
                fetch_config_history(&self.source, checkpoint, errors, &devices, args.workers)
                    .await?;
            }
            let (stats, status) =
                migrate_devices(destination, checkpoint, errors, &devices, args).await?;
            counts.created = stats.created;
            counts.updated = stats.updated;
            if status == PhaseStatus::Incomplete {
                return Ok(MigrationOutcome::Incomplete {
                    phase: MigrationPhase::DeviceMigrate,
                });
            }
            checkpoint.set_phase(MigrationPhase::ConfigHistory)?;
        }

        if !checkpoint.is_phase_completed(MigrationPhase::ConfigHistory) {
            if args.config_history {
                push_config_history(destination.as_ref(), checkpoint, errors).await;
            }
            checkpoint.set_phase(MigrationPhase::GatewayBinding)?;
        }

        let source_bindings =
            fetch_gateway_bindings(&self.source, checkpoint, errors, &devices, args.workers)
                .await?;
        if let Some(bindings) = &source_bindings.bindings {
            let stats = reconcile_gateways(
                destination,
                checkpoint,
                errors,
                bindings,
                args.update_public_keys,
                args.workers,
            )
            .await?;
            if source_bindings.failed > 0 || stats.failed > 0 {
                return Ok(MigrationOutcome::Incomplete {
                    phase: MigrationPhase::GatewayBinding,
                });
            }
        }

        checkpoint.complete()?;
        Ok(MigrationOutcome::Completed)
    }
}
