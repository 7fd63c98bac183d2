//! The import engine: drives a row provider into a SQLite database.
//!
//! The engine is the sole transactional authority. It creates each table,
//! prepares the insert statement, and drains the provider's row stream
//! inside explicit transactions committed every `batch_size` rows. A scan
//! that is interrupted keeps every fully committed batch; a scan that times
//! out additionally commits the rows received since the last batch
//! boundary, so a later run can resume where this one stalled.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use rusqlite::types::Value;
use rusqlite::{params, CachedStatement, Connection};
use tracing::{debug, info};

use crate::config::ImportConfig;
use crate::error::{ImportError, Result};
use crate::inference::ColumnType;
use crate::provider::{Row, RowProvider};
use crate::scan::{self, ScanContext};
use crate::sql;
use crate::watchdog::Watchdog;

/// Name of the error-log table written in log mode.
pub const ERROR_LOG_TABLE: &str = "_mksqlite_errors";

const ERROR_LOG_DDL: &str = "CREATE TABLE IF NOT EXISTS _mksqlite_errors (
    timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
    message TEXT,
    table_name TEXT,
    row_data TEXT
)";

const ERROR_LOG_INSERT: &str =
    "INSERT INTO _mksqlite_errors (message, table_name, row_data) VALUES (?, ?, ?)";

/// Drives providers into SQLite files or arbitrary byte sinks.
pub struct ImportEngine {
    config: ImportConfig,
}

impl ImportEngine {
    pub fn new(config: ImportConfig) -> Self {
        Self { config }
    }

    /// Import into a database at `path`.
    ///
    /// A regular-file (or not-yet-existing) destination is opened by SQLite
    /// directly. Character devices and pipes cannot back a database, so
    /// those build in a temporary file whose bytes are streamed out at the
    /// end.
    pub async fn import_to_path(&self, provider: &dyn RowProvider, path: &Path) -> Result<()> {
        self.import_to_path_with_context(provider, path, None).await
    }

    /// [`Self::import_to_path`] under a caller-supplied cancellation
    /// context.
    pub async fn import_to_path_with_context(
        &self,
        provider: &dyn RowProvider,
        path: &Path,
        parent: Option<ScanContext>,
    ) -> Result<()> {
        if is_regular_destination(path)? {
            // SQLite cannot open a pre-existing non-database file; a fresh
            // import always replaces the destination.
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            self.import_database(provider, path, parent).await
        } else {
            let mut file = OpenOptions::new().write(true).open(path)?;
            self.import_to_writer_with_context(provider, &mut file, parent)
                .await
        }
    }

    /// Import into an arbitrary byte sink by way of a uniquely named
    /// temporary database file, removed on all paths.
    pub async fn import_to_writer<W: Write>(
        &self,
        provider: &dyn RowProvider,
        writer: &mut W,
    ) -> Result<()> {
        self.import_to_writer_with_context(provider, writer, None)
            .await
    }

    pub async fn import_to_writer_with_context<W: Write>(
        &self,
        provider: &dyn RowProvider,
        writer: &mut W,
        parent: Option<ScanContext>,
    ) -> Result<()> {
        let tmp = tempfile::NamedTempFile::new()?;
        let result = self.import_database(provider, tmp.path(), parent).await;

        // Sentinel outcomes still ship the database: it holds every
        // committed batch and is the caller's only record of progress.
        let ship = match &result {
            Ok(()) => true,
            Err(e) => e.is_sentinel(),
        };
        if ship {
            let mut db = File::open(tmp.path())?;
            std::io::copy(&mut db, writer)?;
            writer.flush()?;
        }
        result
    }

    async fn import_database(
        &self,
        provider: &dyn RowProvider,
        db_path: &Path,
        parent: Option<ScanContext>,
    ) -> Result<()> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            r#"
            PRAGMA page_size = 65536;
            PRAGMA cache_size = -2000;
        "#,
        )?;

        if self.config.log_errors {
            conn.execute_batch(ERROR_LOG_DDL)
                .map_err(ImportError::SchemaCreate)?;
        }

        for table in provider.table_names() {
            self.import_table(&conn, provider, &table, parent.clone())
                .await?;
        }
        Ok(())
    }

    async fn import_table(
        &self,
        conn: &Connection,
        provider: &dyn RowProvider,
        table: &str,
        parent: Option<ScanContext>,
    ) -> Result<()> {
        let headers = provider.headers(table);
        if headers.is_empty() {
            debug!("skipping table {} with no headers", table);
            return Ok(());
        }
        let mut types = provider.column_types(table);
        types.resize(headers.len(), ColumnType::Text);

        conn.execute_batch(&sql::create_table(table, &headers, &types))
            .map_err(ImportError::SchemaCreate)?;

        // Inactivity watchdog, inert when no timeout is configured. Signals
        // and the caller's context are folded into the same scan context.
        let watchdog = Watchdog::new(self.config.scan_timeout.unwrap_or(Duration::ZERO));
        let done = watchdog.start();
        let (ctx, _guard) = scan::compose(parent, Some(done));

        let stream = provider.scan_rows(&ctx, table).await?;
        let mut rx = stream.receiver;

        let mut writer = TableWriter::new(
            conn,
            &headers,
            table,
            self.config.effective_batch_size(),
            self.config.log_errors,
        )?;

        conn.execute_batch("BEGIN")?;
        let outcome: Result<()> = loop {
            tokio::select! {
                reason = ctx.cancelled() => break Err(reason.into_error()),
                item = rx.recv() => match item {
                    None => break Ok(()),
                    Some(Ok(row)) => {
                        watchdog.kick();
                        match writer.insert_row(row) {
                            Ok(RowOutcome::Inserted) => {}
                            Ok(RowOutcome::Failed { error, row_data }) => {
                                if self.config.log_errors {
                                    if let Err(e) =
                                        writer.log_error(&error.to_string(), Some(&row_data))
                                    {
                                        break Err(e);
                                    }
                                } else {
                                    break Err(ImportError::RowInsert(error));
                                }
                            }
                            Err(fatal) => break Err(fatal),
                        }
                    }
                    Some(Err(row_err)) => {
                        watchdog.kick();
                        if self.config.log_errors {
                            if let Err(e) =
                                writer.log_error(&row_err.message, row_err.row_data.as_deref())
                            {
                                break Err(e);
                            }
                        } else {
                            break Err(ImportError::ScanProducer(row_err.message));
                        }
                    }
                },
            }
        };
        watchdog.stop();
        // Closing the receiver tells producers to wind down.
        drop(rx);

        match outcome {
            Ok(()) => {
                conn.execute_batch("COMMIT")?;
                info!("imported {} rows into {}", writer.inserted, table);
                Ok(())
            }
            Err(ImportError::ScanTimeout) => {
                // Keep the partial batch: it is real progress a resumed run
                // should not have to redo.
                conn.execute_batch("COMMIT")?;
                Err(ImportError::ScanTimeout)
            }
            Err(e) => {
                // Interrupts and failures discard the partial batch; every
                // batch committed before the event survives.
                let _ = conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }
}

enum RowOutcome {
    Inserted,
    Failed {
        error: rusqlite::Error,
        row_data: String,
    },
}

/// Per-table insert state: the prepared statements and the row counter that
/// drives batch commits.
struct TableWriter<'conn> {
    conn: &'conn Connection,
    insert: CachedStatement<'conn>,
    log_insert: Option<CachedStatement<'conn>>,
    table: String,
    arity: usize,
    batch_size: usize,
    inserted: u64,
}

impl<'conn> TableWriter<'conn> {
    fn new(
        conn: &'conn Connection,
        headers: &[String],
        table: &str,
        batch_size: usize,
        log_errors: bool,
    ) -> Result<Self> {
        let insert = conn.prepare_cached(&sql::insert_placeholders(table, headers))?;
        let log_insert = if log_errors {
            Some(conn.prepare_cached(ERROR_LOG_INSERT)?)
        } else {
            None
        };
        Ok(Self {
            conn,
            insert,
            log_insert,
            table: table.to_string(),
            arity: headers.len(),
            batch_size,
            inserted: 0,
        })
    }

    /// Insert one row, normalizing its arity to the header count first.
    ///
    /// A binding or constraint failure comes back as `RowOutcome::Failed`
    /// so the caller can apply the strict/log policy; the outer error is
    /// reserved for transaction failures, which are always fatal.
    fn insert_row(&mut self, mut row: Row) -> Result<RowOutcome> {
        row.resize(self.arity, Value::Null);
        if let Err(error) = self.insert.execute(rusqlite::params_from_iter(row.iter())) {
            return Ok(RowOutcome::Failed {
                error,
                row_data: row_repr(&row),
            });
        }
        self.inserted += 1;
        if self.inserted % self.batch_size as u64 == 0 {
            self.conn.execute_batch("COMMIT; BEGIN")?;
            debug!("committed batch at {} rows for {}", self.inserted, self.table);
        }
        Ok(RowOutcome::Inserted)
    }

    /// Append one entry to the error-log table.
    fn log_error(&mut self, message: &str, row_data: Option<&str>) -> Result<()> {
        if let Some(stmt) = self.log_insert.as_mut() {
            stmt.execute(params![message, self.table, row_data])?;
        }
        Ok(())
    }
}

/// Best-effort string form of a row for the error log.
fn row_repr(row: &[Value]) -> String {
    row.iter()
        .map(sql::render_literal)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Whether SQLite may open the destination path directly.
fn is_regular_destination(path: &Path) -> Result<bool> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(meta.file_type().is_file()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e.into()),
    }
}
