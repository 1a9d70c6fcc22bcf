//! # Migrate Subcommand
//!
//! Resolves registry credentials from service-account files, builds the
//! [`MigrationArgs`] of the run and hands over to the engine.
//!
//! The destination region defaults to the source region. Each registry's
//! project is taken from its service account.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{ArgAction, Args};
use regmig_client::retry::{DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_RETRIES};
use regmig_client::{
    fetch_registry_credentials, DeviceRegistry, HttpRegistryClient, RegistryConfig, RetryPolicy,
    ServiceAccount,
};
use regmig_core::args::{DEFAULT_PAGE_SIZE, DEFAULT_WORKERS};
use regmig_core::{MigrationArgs, RegistryCoordinates};
use regmig_engine::{MigrationOutcome, MigrationSummary, Migrator};

use crate::{EXIT_INCOMPLETE, EXIT_OK};

/// Arguments for the migrate subcommand.
#[derive(Args, Debug, Clone)]
pub struct MigrateArgs {
    /// Service-account file of the source project.
    #[arg(long, alias = "cbSourceServiceAccount")]
    pub source_service_account: PathBuf,

    /// Source registry name.
    #[arg(long, alias = "cbSourceRegistryName")]
    pub source_registry: String,

    /// Source registry region.
    #[arg(long, alias = "cbSourceRegion")]
    pub source_region: String,

    /// Service-account file of the destination project. Required unless exporting.
    #[arg(long, alias = "cbServiceAccount")]
    pub service_account: Option<PathBuf>,

    /// Destination registry name. Required unless exporting.
    #[arg(long, alias = "cbRegistryName")]
    pub registry: Option<String>,

    /// Destination registry region. Defaults to the source region.
    #[arg(long, alias = "cbRegistryRegion")]
    pub region: Option<String>,

    /// CSV with a `deviceId` column restricting the run to those devices.
    #[arg(long, alias = "devicesCsv")]
    pub devices_csv: Option<PathBuf>,

    /// Copy each device's configuration version history.
    #[arg(long, alias = "configHistory", default_value_t = true, action = ArgAction::Set)]
    pub config_history: bool,

    /// Carry credentials over and replace them on existing devices.
    #[arg(long, alias = "updatePublicKeys", default_value_t = true, action = ArgAction::Set)]
    pub update_public_keys: bool,

    /// Do not push the latest configuration to devices that already exist.
    #[arg(long, alias = "skipConfig")]
    pub skip_config: bool,

    /// Delete everything in the destination registry before migrating.
    #[arg(long, alias = "cleanupCbRegistry")]
    pub cleanup_destination: bool,

    /// Export device IDs in CSV batches of this size instead of migrating.
    #[arg(long, alias = "exportBatchSize", default_value_t = 0)]
    pub export_batch_size: usize,

    /// Directory for the checkpoint and exported batches.
    #[arg(long, default_value = ".")]
    pub work_dir: PathBuf,

    /// Directory for the failed-devices report. Defaults to the work directory.
    #[arg(long)]
    pub report_dir: Option<PathBuf>,

    /// Concurrent workers per phase.
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Devices requested per list page.
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: u32,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Retries of a registry request that failed to reach the server.
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// First retry delay in milliseconds; doubles on each further retry.
    #[arg(long, default_value_t = DEFAULT_BASE_DELAY_MS)]
    pub retry_delay_ms: u64,
}

impl MigrateArgs {
    pub fn is_export(&self) -> bool {
        self.export_batch_size > 0
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_delay_ms))
    }

    /// Build the run configuration. `destination` is the destination
    /// service account, `None` in export mode.
    pub fn to_migration_args(
        &self,
        source: &ServiceAccount,
        destination: Option<&ServiceAccount>,
    ) -> anyhow::Result<MigrationArgs> {
        let destination = match destination {
            None => None,
            Some(account) => {
                let Some(registry) = self.registry.clone() else {
                    bail!("--registry is required unless --export-batch-size is set");
                };
                Some(RegistryCoordinates {
                    project: account.project.clone(),
                    region: self
                        .region
                        .clone()
                        .unwrap_or_else(|| self.source_region.clone()),
                    registry,
                })
            }
        };
        let args = MigrationArgs {
            source: RegistryCoordinates {
                project: source.project.clone(),
                region: self.source_region.clone(),
                registry: self.source_registry.clone(),
            },
            destination,
            devices_csv: self.devices_csv.clone(),
            config_history: self.config_history,
            update_public_keys: self.update_public_keys,
            skip_config: self.skip_config,
            cleanup_destination: self.cleanup_destination,
            export_batch_size: self.export_batch_size,
            work_dir: self.work_dir.clone(),
            workers: self.workers,
            page_size: self.page_size,
        };
        args.validate()?;
        Ok(args)
    }
}

async fn connect(
    account: &ServiceAccount,
    coords: &RegistryCoordinates,
    args: &MigrateArgs,
) -> anyhow::Result<Arc<dyn DeviceRegistry>> {
    let config: RegistryConfig =
        fetch_registry_credentials(account, coords, args.timeout_secs, args.retry_policy())
            .await
            .with_context(|| {
                format!("resolving credentials of registry {}", coords.registry_path())
            })?;
    let config = config.with_page_size(args.page_size);
    tracing::info!(registry = %coords.registry_path(), url = %config.base_url, "connected");
    let client = HttpRegistryClient::new(config)
        .with_context(|| format!("building client for {}", coords.registry))?;
    Ok(Arc::new(client))
}

/// Run the migrate subcommand.
pub async fn run_migrate(args: &MigrateArgs) -> anyhow::Result<u8> {
    let source_account = ServiceAccount::from_file(&args.source_service_account)
        .context("loading source service account")?;
    let destination_account = if args.is_export() {
        None
    } else {
        let Some(path) = &args.service_account else {
            bail!("--service-account is required unless --export-batch-size is set");
        };
        Some(ServiceAccount::from_file(path).context("loading destination service account")?)
    };

    let run_args = args.to_migration_args(&source_account, destination_account.as_ref())?;

    let source = connect(&source_account, &run_args.source, args).await?;
    let mut migrator = Migrator::new(run_args.clone(), source);
    if let (Some(account), Some(coords)) = (&destination_account, &run_args.destination) {
        migrator = migrator.with_destination(connect(account, coords, args).await?);
    }
    if let Some(dir) = &args.report_dir {
        migrator = migrator.with_report_dir(dir);
    }

    let summary = migrator.run().await.context("migration failed")?;
    print_summary(&summary);
    Ok(exit_code(&summary))
}

/// Exit code for a finished run.
pub fn exit_code(summary: &MigrationSummary) -> u8 {
    match summary.outcome {
        MigrationOutcome::Completed => EXIT_OK,
        MigrationOutcome::Incomplete { .. } => EXIT_INCOMPLETE,
    }
}

fn print_summary(summary: &MigrationSummary) {
    if !summary.exported.is_empty() {
        println!("Exported {} device batches:", summary.exported.len());
        for path in &summary.exported {
            println!("  {}", path.display());
        }
    }
    println!(
        "Devices: {} fetched, {} migrated ({} created, {} updated this run)",
        summary.fetched, summary.migrated, summary.created, summary.updated
    );
    println!("Gateways processed: {}", summary.gateways_processed);
    if let Some(path) = &summary.report_path {
        println!(
            "{} failures recorded in {}",
            summary.error_count,
            path.display()
        );
    }
    match summary.outcome {
        MigrationOutcome::Completed => println!("Migration complete."),
        MigrationOutcome::Incomplete { phase } => {
            println!("Migration stopped in phase {phase}. Run the same command again to resume.")
        }
    }
}
