//! Import configuration passed from the CLI to drivers and the engine.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::identifier::{sanitize_one, TABLE_PREFIX};

/// Rows per transaction when no batch size is configured.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Options shared by every driver and the import engine.
///
/// Durations deserialize from humantime strings (`"20s"`, `"2m"`), matching
/// the CLI flag syntax.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Override for the default table identifier; empty means the driver
    /// default (`tb0`).
    pub table_name: String,
    /// Delimiter for delimited text. `None` sniffs from the source.
    pub delimiter: Option<char>,
    /// Enable header-row assessment over the first rows of a delimited
    /// source instead of assuming row 0.
    pub advanced_header_detection: bool,
    /// Root path for the filesystem driver.
    pub input_path: Option<PathBuf>,
    /// Resume point for the filesystem driver: entries sorting below this
    /// path are skipped.
    pub resume_path: Option<PathBuf>,
    /// Idle timeout for a scan; `None` disables the watchdog.
    #[serde(with = "humantime_serde")]
    pub scan_timeout: Option<Duration>,
    /// Rows per transaction.
    pub batch_size: usize,
    /// Capture row errors in `_mksqlite_errors` instead of aborting.
    pub log_errors: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            table_name: String::new(),
            delimiter: None,
            advanced_header_detection: false,
            input_path: None,
            resume_path: None,
            scan_timeout: None,
            batch_size: DEFAULT_BATCH_SIZE,
            log_errors: false,
        }
    }
}

impl ImportConfig {
    /// Resolve the single-table name for drivers that produce one table.
    ///
    /// An empty override falls through to the deterministic `tb0` fallback;
    /// a non-empty override is sanitized like any other raw name.
    pub fn resolved_table_name(&self) -> String {
        sanitize_one(&self.table_name, TABLE_PREFIX, 0)
    }

    /// Batch size, guarding against a zero from config files.
    pub fn effective_batch_size(&self) -> usize {
        if self.batch_size == 0 {
            DEFAULT_BATCH_SIZE
        } else {
            self.batch_size
        }
    }
}
