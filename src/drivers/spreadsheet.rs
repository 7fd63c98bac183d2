//! Spreadsheet driver for XLSX/XLS workbooks.
//!
//! The workbook format needs random access, so the source is buffered into
//! memory and handed to calamine. One table per sheet; the first row is the
//! header row.

use std::io::{Cursor, Read};
use std::sync::Mutex;

use async_trait::async_trait;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use rusqlite::types::Value;

use crate::config::ImportConfig;
use crate::error::{ImportError, Result};
use crate::identifier::{sanitize_identifiers, COLUMN_PREFIX, TABLE_PREFIX};
use crate::inference::{infer_column_types, sample_window, ColumnType};
use crate::provider::{replay_rows, table_index, Row, RowProvider, RowStream};
use crate::registry::SourceReader;
use crate::scan::ScanContext;

pub struct SpreadsheetProvider {
    names: Vec<String>,
    sheets: Vec<SheetData>,
}

struct SheetData {
    headers: Vec<String>,
    types: Vec<ColumnType>,
    rows: Mutex<Option<Vec<Row>>>,
}

/// Driver factory registered under `xlsx` (also handles `.xls`).
pub fn factory(mut reader: SourceReader, config: &ImportConfig) -> Result<Box<dyn RowProvider>> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| ImportError::ProviderInit(format!("workbook: {}", e)))?;

    let sheet_names = workbook.sheet_names().to_vec();
    let mut raw_names = Vec::new();
    let mut sheets = Vec::new();

    for sheet in &sheet_names {
        let range = workbook
            .worksheet_range(sheet)
            .map_err(|e| ImportError::ProviderInit(format!("sheet {}: {}", sheet, e)))?;

        let mut rows_iter = range.rows();
        let raw_headers: Vec<String> = match rows_iter.next() {
            Some(cells) => cells.iter().map(cell_to_string).collect(),
            None => Vec::new(),
        };
        let rows: Vec<Row> = rows_iter
            .map(|cells| cells.iter().map(cell_to_value).collect())
            .collect();

        let headers = sanitize_identifiers(&raw_headers, COLUMN_PREFIX);
        let types = infer_column_types(sample_window(&rows), headers.len());

        raw_names.push(sheet.clone());
        sheets.push(SheetData {
            headers,
            types,
            rows: Mutex::new(Some(rows)),
        });
    }

    let names = if sheets.len() == 1 && !config.table_name.is_empty() {
        vec![config.resolved_table_name()]
    } else {
        sanitize_identifiers(&raw_names, TABLE_PREFIX)
    };

    Ok(Box::new(SpreadsheetProvider { names, sheets }))
}

#[async_trait]
impl RowProvider for SpreadsheetProvider {
    fn table_names(&self) -> Vec<String> {
        self.names.clone()
    }

    fn headers(&self, table: &str) -> Vec<String> {
        match table_index(&self.names, table) {
            Ok(i) => self.sheets[i].headers.clone(),
            Err(_) => Vec::new(),
        }
    }

    fn column_types(&self, table: &str) -> Vec<ColumnType> {
        match table_index(&self.names, table) {
            Ok(i) => self.sheets[i].types.clone(),
            Err(_) => Vec::new(),
        }
    }

    async fn scan_rows(&self, ctx: &ScanContext, table: &str) -> Result<RowStream> {
        let i = table_index(&self.names, table)?;
        let rows = self.sheets[i]
            .rows
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ImportError::ScanProducer("source already consumed".to_string()))?;
        Ok(replay_rows(ctx, rows))
    }
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::Int(i) => Value::Integer(*i),
        Data::Float(f) => Value::Real(*f),
        Data::Bool(b) => Value::Integer(*b as i64),
        Data::String(s) => Value::Text(s.clone()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => Value::Text(naive.format("%Y-%m-%dT%H:%M:%S").to_string()),
            None => Value::Real(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::Text(s.clone()),
        Data::Error(e) => Value::Text(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_conversions() {
        assert_eq!(cell_to_value(&Data::Empty), Value::Null);
        assert_eq!(cell_to_value(&Data::Int(7)), Value::Integer(7));
        assert_eq!(cell_to_value(&Data::Float(2.5)), Value::Real(2.5));
        assert_eq!(cell_to_value(&Data::Bool(true)), Value::Integer(1));
        assert_eq!(
            cell_to_value(&Data::String("x".to_string())),
            Value::Text("x".to_string())
        );
    }

    #[test]
    fn test_header_cell_strings() {
        assert_eq!(cell_to_string(&Data::String("Name".to_string())), "Name");
        assert_eq!(cell_to_string(&Data::Empty), "");
        assert_eq!(cell_to_string(&Data::Int(3)), "3");
    }

    #[test]
    fn test_invalid_workbook_is_an_init_error() {
        let reader: SourceReader = Box::new(Cursor::new(b"not a workbook".to_vec()));
        let err = factory(reader, &ImportConfig::default()).err().unwrap();
        assert!(matches!(err, ImportError::ProviderInit(_)));
    }
}
