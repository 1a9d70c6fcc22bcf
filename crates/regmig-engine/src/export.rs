//! Batch export of device IDs.
//!
//! Writes `batch_1.csv … batch_N.csv`, each a `deviceId` column of at most
//! `batch_size` IDs in ascending order. Each file can be fed back as a
//! device-ID CSV input to migrate that batch alone.

use std::path::{Path, PathBuf};

use regmig_core::{CoreError, Device, DeviceId};

use crate::csv::render_device_ids;
use crate::error::EngineError;

/// Write the IDs of `devices` into batch files under `dir`.
pub fn export_batches(
    devices: &[Device],
    dir: &Path,
    batch_size: usize,
) -> Result<Vec<PathBuf>, EngineError> {
    if batch_size == 0 {
        return Err(CoreError::InvalidArgument {
            name: "export_batch_size",
            reason: "must be positive".into(),
        }
        .into());
    }
    let mut ids: Vec<DeviceId> = devices.iter().map(|d| d.id.clone()).collect();
    ids.sort();
    ids.dedup();

    std::fs::create_dir_all(dir).map_err(|source| EngineError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut written = Vec::new();
    for (n, batch) in ids.chunks(batch_size).enumerate() {
        let path = dir.join(format!("batch_{}.csv", n + 1));
        std::fs::write(&path, render_device_ids(batch)).map_err(|source| EngineError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), devices = batch.len(), "wrote export batch");
        written.push(path);
    }
    tracing::info!(batches = written.len(), devices = ids.len(), "exported device batches");
    Ok(written)
}
