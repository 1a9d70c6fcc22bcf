//! # Error Aggregator
//!
//! Thread-safe, append-only collection of per-item failures. Every entry is
//! also logged at `warn` when recorded. At the end of a run a non-empty
//! aggregator is written as `failed_devices_<timestamp>.csv`.

use std::fmt::Display;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use regmig_core::DeviceId;

use crate::csv::quote_field;
use crate::error::EngineError;

/// One failed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorLogEntry {
    /// What was being attempted, e.g. `Create device`.
    pub context: String,
    /// The device or gateway concerned; `None` for aggregate operations.
    pub device_id: Option<DeviceId>,
    pub error: String,
}

/// Collects [`ErrorLogEntry`] values from concurrent tasks.
#[derive(Debug, Default)]
pub struct ErrorAggregator {
    entries: Mutex<Vec<ErrorLogEntry>>,
}

impl ErrorAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure concerning one device.
    pub fn add(&self, context: &str, device_id: &DeviceId, error: impl Display) {
        let error = error.to_string();
        tracing::warn!(context, device_id = %device_id, "{error}");
        self.entries.lock().push(ErrorLogEntry {
            context: context.to_string(),
            device_id: Some(device_id.clone()),
            error,
        });
    }

    /// Record a failure not tied to a single device.
    pub fn add_general(&self, context: &str, error: impl Display) {
        let error = error.to_string();
        tracing::warn!(context, "{error}");
        self.entries.lock().push(ErrorLogEntry {
            context: context.to_string(),
            device_id: None,
            error,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> Vec<ErrorLogEntry> {
        self.entries.lock().clone()
    }

    /// Render entries as CSV with a `context,error,deviceId` header.
    pub fn render_csv(&self) -> String {
        let entries = self.entries.lock();
        let mut out = String::from("context,error,deviceId\n");
        for entry in entries.iter() {
            let id = entry.device_id.as_ref().map(DeviceId::as_str).unwrap_or("");
            out.push_str(&format!(
                "{},{},{}\n",
                quote_field(&entry.context),
                quote_field(&entry.error),
                quote_field(id)
            ));
        }
        out
    }

    /// Write `failed_devices_<YYYY-MM-DDTHH-MM-SS>.csv` into `dir`.
    ///
    /// Returns `None` without touching the filesystem when nothing failed.
    pub fn write_report(&self, dir: &Path) -> Result<Option<PathBuf>, EngineError> {
        if self.is_empty() {
            return Ok(None);
        }
        let stamp = chrono::Local::now().format("%Y-%m-%dT%H-%M-%S");
        let path = dir.join(format!("failed_devices_{stamp}.csv"));
        std::fs::create_dir_all(dir).map_err(|source| EngineError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        std::fs::write(&path, self.render_csv()).map_err(|source| EngineError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::info!(path = %path.display(), failures = self.len(), "wrote failed devices report");
        Ok(Some(path))
    }
}
