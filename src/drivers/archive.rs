//! ZIP archive driver: one table listing the central directory.

use std::io::{Cursor, Read};
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::types::Value;
use zip::ZipArchive;

use crate::config::ImportConfig;
use crate::error::{ImportError, Result};
use crate::inference::ColumnType;
use crate::provider::{replay_rows, Row, RowProvider, RowStream};
use crate::registry::SourceReader;
use crate::scan::ScanContext;

const HEADERS: &[&str] = &[
    "name",
    "size",
    "compressed_size",
    "mod_time",
    "is_dir",
    "crc32",
];

const TYPES: &[ColumnType] = &[
    ColumnType::Text,
    ColumnType::Integer,
    ColumnType::Integer,
    ColumnType::Text,
    ColumnType::Integer,
    ColumnType::Integer,
];

pub struct ArchiveProvider {
    table: String,
    rows: Mutex<Option<Vec<Row>>>,
}

/// Driver factory registered under `zip`. The format needs random access,
/// so the source is buffered into memory first.
pub fn factory(mut reader: SourceReader, config: &ImportConfig) -> Result<Box<dyn RowProvider>> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ImportError::ProviderInit(format!("zip: {}", e)))?;

    let mut rows = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| ImportError::ProviderInit(format!("zip entry {}: {}", i, e)))?;
        let mod_time = entry
            .last_modified()
            .map(|dt| {
                format!(
                    "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
                    dt.year(),
                    dt.month(),
                    dt.day(),
                    dt.hour(),
                    dt.minute(),
                    dt.second()
                )
            })
            .unwrap_or_default();
        rows.push(vec![
            Value::Text(entry.name().to_string()),
            Value::Integer(entry.size() as i64),
            Value::Integer(entry.compressed_size() as i64),
            Value::Text(mod_time),
            Value::Integer(entry.is_dir() as i64),
            Value::Integer(entry.crc32() as i64),
        ]);
    }

    Ok(Box::new(ArchiveProvider {
        table: config.resolved_table_name(),
        rows: Mutex::new(Some(rows)),
    }))
}

#[async_trait]
impl RowProvider for ArchiveProvider {
    fn table_names(&self) -> Vec<String> {
        vec![self.table.clone()]
    }

    fn headers(&self, _table: &str) -> Vec<String> {
        HEADERS.iter().map(|h| h.to_string()).collect()
    }

    fn column_types(&self, _table: &str) -> Vec<ColumnType> {
        TYPES.to_vec()
    }

    async fn scan_rows(&self, ctx: &ScanContext, _table: &str) -> Result<RowStream> {
        let rows = self
            .rows
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ImportError::ScanProducer("source already consumed".to_string()))?;
        Ok(replay_rows(ctx, rows))
    }
}
