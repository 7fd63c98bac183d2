//! The row-provider contract that format drivers implement.
//!
//! A provider adapts one source format to a uniform shape: a list of
//! sanitized table names, per-table sanitized headers and column types, and
//! a streaming row scan. The scan hands rows to the consumer through a
//! bounded channel, which is what gives the pipeline backpressure and
//! bounded memory regardless of source size.

use async_trait::async_trait;
use rusqlite::types::Value;
use tokio::sync::mpsc;

use crate::error::{ImportError, Result};
use crate::inference::ColumnType;
use crate::scan::ScanContext;

/// Capacity of the bounded row channel between a producer and the engine.
pub const ROW_CHANNEL_CAPACITY: usize = 100;

/// One record from a source, in source column order. The engine normalizes
/// arity (null-padding or truncating) before binding, so providers may emit
/// ragged rows.
pub type Row = Vec<Value>;

/// A recoverable per-row error observed by a producer.
///
/// In strict mode the engine aborts on the first of these; in log mode it
/// appends one entry to the error-log table and continues scanning.
#[derive(Debug)]
pub struct RowError {
    /// Human-readable cause.
    pub message: String,
    /// Best-effort string form of the offending row, when one exists.
    pub row_data: Option<String>,
}

impl RowError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            row_data: None,
        }
    }

    pub fn with_row(message: impl Into<String>, row_data: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            row_data: Some(row_data.into()),
        }
    }
}

/// Item yielded by a row scan: a row, or a recoverable per-row error.
pub type RowItem = std::result::Result<Row, RowError>;

/// Streaming scan results for one table.
///
/// Dropping the receiver is the early-termination request: producers notice
/// the closed channel on their next send and exit. Rows arrive in source
/// order.
pub struct RowStream {
    pub receiver: mpsc::Receiver<RowItem>,
}

impl RowStream {
    /// Create a stream along with the producer-side sender.
    pub fn channel() -> (mpsc::Sender<RowItem>, RowStream) {
        let (tx, rx) = mpsc::channel(ROW_CHANNEL_CAPACITY);
        (tx, RowStream { receiver: rx })
    }
}

/// A format-specific source adapter.
///
/// Schema discovery (`table_names`, `headers`, `column_types`) happens at
/// construction time from a bounded sample of the source; `scan_rows` is the
/// lazy part. All names returned from this trait are already sanitized.
#[async_trait]
pub trait RowProvider: Send + Sync {
    /// Ordered, sanitized table identifiers this source produces.
    fn table_names(&self) -> Vec<String>;

    /// Ordered, sanitized column identifiers for a table. An empty list
    /// tells the engine to skip the table entirely.
    fn headers(&self, table: &str) -> Vec<String>;

    /// Column types, same length as `headers`. Defaults to all TEXT.
    fn column_types(&self, table: &str) -> Vec<ColumnType> {
        vec![ColumnType::Text; self.headers(table).len()]
    }

    /// Start streaming rows for a table.
    ///
    /// Implementations spawn a producer that feeds the returned stream's
    /// bounded channel and must honor `ctx` cancellation between rows.
    /// Failures that prevent the scan from starting at all are returned
    /// here; mid-stream recoverable errors flow through the channel as
    /// [`RowError`] items.
    async fn scan_rows(&self, ctx: &ScanContext, table: &str) -> Result<RowStream>;
}

/// Send one item from an async producer, racing against cancellation.
///
/// Returns false when the scan is over, either because the context was
/// cancelled or because the consumer dropped the receiver; producers should
/// stop promptly in both cases.
pub async fn send_item(ctx: &ScanContext, tx: &mpsc::Sender<RowItem>, item: RowItem) -> bool {
    tokio::select! {
        _ = ctx.cancelled() => false,
        sent = tx.send(item) => sent.is_ok(),
    }
}

/// Blocking-context variant of [`send_item`] for `spawn_blocking` producers.
pub fn blocking_send_item(ctx: &ScanContext, tx: &mpsc::Sender<RowItem>, item: RowItem) -> bool {
    if ctx.stop_reason().is_some() {
        return false;
    }
    tx.blocking_send(item).is_ok()
}

/// Convenience for providers that buffer their tables up front (spreadsheet
/// sheets, HTML tables, archive listings): replay pre-built rows through a
/// fresh stream, still honoring cancellation and backpressure.
pub fn replay_rows(ctx: &ScanContext, rows: Vec<Row>) -> RowStream {
    let (tx, stream) = RowStream::channel();
    let ctx = ctx.clone();
    tokio::spawn(async move {
        for row in rows {
            if !send_item(&ctx, &tx, Ok(row)).await {
                break;
            }
        }
    });
    stream
}

/// Look up a table's position in a provider's declared names, for providers
/// that index internal storage by table ordinal.
pub fn table_index(names: &[String], table: &str) -> Result<usize> {
    names
        .iter()
        .position(|n| n == table)
        .ok_or_else(|| ImportError::ProviderInit(format!("unknown table: {}", table)))
}
