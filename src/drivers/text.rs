//! Plain-text driver: one row per line, one TEXT column.

use std::io::{BufRead, BufReader};
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::types::Value;

use crate::config::ImportConfig;
use crate::error::{ImportError, Result};
use crate::provider::{blocking_send_item, RowError, RowProvider, RowStream};
use crate::registry::SourceReader;
use crate::scan::ScanContext;

pub struct TextProvider {
    table: String,
    reader: Mutex<Option<BufReader<SourceReader>>>,
}

/// Driver factory registered under `txt`.
pub fn factory(reader: SourceReader, config: &ImportConfig) -> Result<Box<dyn RowProvider>> {
    Ok(Box::new(TextProvider {
        table: config.resolved_table_name(),
        reader: Mutex::new(Some(BufReader::new(reader))),
    }))
}

#[async_trait]
impl RowProvider for TextProvider {
    fn table_names(&self) -> Vec<String> {
        vec![self.table.clone()]
    }

    fn headers(&self, _table: &str) -> Vec<String> {
        vec!["line".to_string()]
    }

    async fn scan_rows(&self, ctx: &ScanContext, _table: &str) -> Result<RowStream> {
        let reader = self
            .reader
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ImportError::ScanProducer("source already consumed".to_string()))?;

        let (tx, stream) = RowStream::channel();
        let ctx = ctx.clone();
        tokio::task::spawn_blocking(move || {
            for line in reader.lines() {
                let item = match line {
                    Ok(line) => Ok(vec![Value::Text(line)]),
                    Err(e) => Err(RowError::new(format!("read: {}", e))),
                };
                let stop = item.is_err();
                if !blocking_send_item(&ctx, &tx, item) || stop {
                    return;
                }
            }
        });
        Ok(stream)
    }
}
