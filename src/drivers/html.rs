//! HTML table driver.
//!
//! Parses the document at construction and extracts every `<table>` into
//! plain cell text, so the DOM never crosses a thread boundary. Header
//! cells come from `<th>` elements when the table has them, otherwise from
//! the first row.

use std::io::Read;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::types::Value;
use scraper::{Html, Selector};

use crate::config::ImportConfig;
use crate::error::{ImportError, Result};
use crate::identifier::{sanitize_identifiers, COLUMN_PREFIX, TABLE_PREFIX};
use crate::inference::{infer_column_types, sample_window, ColumnType};
use crate::provider::{replay_rows, table_index, Row, RowProvider, RowStream};
use crate::registry::SourceReader;
use crate::scan::ScanContext;

pub struct HtmlProvider {
    names: Vec<String>,
    tables: Vec<TableData>,
}

struct TableData {
    headers: Vec<String>,
    types: Vec<ColumnType>,
    rows: Mutex<Option<Vec<Row>>>,
}

/// Driver factory registered under `html`.
pub fn factory(mut reader: SourceReader, config: &ImportConfig) -> Result<Box<dyn RowProvider>> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    Ok(Box::new(HtmlProvider::from_document(&text, config)))
}

impl HtmlProvider {
    fn from_document(text: &str, config: &ImportConfig) -> Self {
        let document = Html::parse_document(text);
        let table_sel = Selector::parse("table").unwrap();
        let tr_sel = Selector::parse("tr").unwrap();
        let th_sel = Selector::parse("th").unwrap();
        let cell_sel = Selector::parse("th, td").unwrap();

        let mut raw_names = Vec::new();
        let mut extracted: Vec<(Vec<String>, Vec<Vec<String>>)> = Vec::new();

        for table_el in document.select(&table_sel) {
            raw_names.push(table_el.value().attr("id").unwrap_or_default().to_string());

            let mut header_cells: Vec<String> = Vec::new();
            let mut data_rows: Vec<Vec<String>> = Vec::new();
            let has_th = table_el.select(&th_sel).next().is_some();

            for tr in table_el.select(&tr_sel) {
                let is_header_row = tr.select(&th_sel).next().is_some();
                let cells: Vec<String> = tr
                    .select(&cell_sel)
                    .map(|cell| normalize_text(&cell.text().collect::<String>()))
                    .collect();
                if cells.is_empty() {
                    continue;
                }
                if has_th {
                    if is_header_row && header_cells.is_empty() {
                        header_cells = cells;
                    } else if !is_header_row {
                        data_rows.push(cells);
                    }
                } else if header_cells.is_empty() {
                    header_cells = cells;
                } else {
                    data_rows.push(cells);
                }
            }
            extracted.push((header_cells, data_rows));
        }

        // A lone table honors the table-name override; multi-table
        // documents keep their sanitized ids and ordinal fallbacks.
        let names = if extracted.len() == 1 && !config.table_name.is_empty() {
            vec![config.resolved_table_name()]
        } else {
            sanitize_identifiers(&raw_names, TABLE_PREFIX)
        };

        let tables = extracted
            .into_iter()
            .map(|(raw_headers, raw_rows)| {
                let headers = sanitize_identifiers(&raw_headers, COLUMN_PREFIX);
                let rows: Vec<Row> = raw_rows
                    .into_iter()
                    .map(|cells| cells.into_iter().map(Value::Text).collect())
                    .collect();
                let types = infer_column_types(sample_window(&rows), headers.len());
                TableData {
                    headers,
                    types,
                    rows: Mutex::new(Some(rows)),
                }
            })
            .collect();

        Self { names, tables }
    }
}

#[async_trait]
impl RowProvider for HtmlProvider {
    fn table_names(&self) -> Vec<String> {
        self.names.clone()
    }

    fn headers(&self, table: &str) -> Vec<String> {
        match table_index(&self.names, table) {
            Ok(i) => self.tables[i].headers.clone(),
            Err(_) => Vec::new(),
        }
    }

    fn column_types(&self, table: &str) -> Vec<ColumnType> {
        match table_index(&self.names, table) {
            Ok(i) => self.tables[i].types.clone(),
            Err(_) => Vec::new(),
        }
    }

    async fn scan_rows(&self, ctx: &ScanContext, table: &str) -> Result<RowStream> {
        let i = table_index(&self.names, table)?;
        let rows = self.tables[i]
            .rows
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ImportError::ScanProducer("source already consumed".to_string()))?;
        Ok(replay_rows(ctx, rows))
    }
}

fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
