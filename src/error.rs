//! Error types for the import pipeline.

use thiserror::Error;

/// Errors produced while materializing a source into SQLite.
///
/// `Interrupted` and `ScanTimeout` are sentinels: the engine commits the
/// transaction that was open when they occurred, so every batch that reached
/// a commit boundary is preserved in the output database.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Unsupported input type: {0}")]
    UnsupportedType(String),

    #[error("Unknown driver: {0}")]
    UnknownDriver(String),

    #[error("Driver already registered: {0}")]
    DriverExists(String),

    #[error("Provider initialization failed: {0}")]
    ProviderInit(String),

    #[error("Schema creation failed: {0}")]
    SchemaCreate(#[source] rusqlite::Error),

    #[error("Row insert failed: {0}")]
    RowInsert(#[source] rusqlite::Error),

    #[error("Source read failed: {0}")]
    ScanProducer(String),

    #[error("Import interrupted")]
    Interrupted,

    #[error("Scan timed out waiting for rows")]
    ScanTimeout,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ImportError {
    /// Whether this error is a cancellation sentinel rather than a failure.
    ///
    /// Sentinel errors still exit with a non-zero status, but the database
    /// written so far is valid and contains every committed batch.
    pub fn is_sentinel(&self) -> bool {
        matches!(self, ImportError::Interrupted | ImportError::ScanTimeout)
    }
}

pub type Result<T> = std::result::Result<T, ImportError>;
