//! Delimited-text driver (CSV and friends).
//!
//! Construction reads a bounded prefix of the source: ~2 KiB for delimiter
//! sniffing, then up to 26 records for header-row assessment and the type
//! inference sample. Scanning replays the buffered records and streams the
//! remainder through a blocking producer, so memory stays bounded no matter
//! how large the file is.

use std::io::Read;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::types::Value;
use tracing::debug;

use crate::config::ImportConfig;
use crate::error::{ImportError, Result};
use crate::identifier::{sanitize_identifiers, COLUMN_PREFIX};
use crate::inference::{detect_header_row, infer_column_types, sample_window, ColumnType};
use crate::provider::{blocking_send_item, Row, RowError, RowProvider, RowStream};
use crate::registry::SourceReader;
use crate::scan::ScanContext;

/// Bytes examined when sniffing the delimiter.
const SNIFF_WINDOW: usize = 2048;

/// Records buffered at construction: up to ten header candidates plus the
/// rows 5–15 inference sample behind the latest possible header.
const INITIAL_RECORDS: usize = 26;

const DELIMITER_CANDIDATES: &[u8] = &[b',', b'\t', b';', b'|'];

pub struct DelimitedProvider {
    table: String,
    headers: Vec<String>,
    types: Vec<ColumnType>,
    state: Mutex<Option<ScanState>>,
}

struct ScanState {
    buffered: Vec<Row>,
    reader: csv::Reader<Box<dyn Read + Send>>,
}

/// Driver factory registered under `csv`.
pub fn factory(reader: SourceReader, config: &ImportConfig) -> Result<Box<dyn RowProvider>> {
    Ok(Box::new(DelimitedProvider::from_reader(reader, config)?))
}

impl DelimitedProvider {
    pub fn from_reader(mut reader: SourceReader, config: &ImportConfig) -> Result<Self> {
        let mut probe = vec![0u8; SNIFF_WINDOW];
        let mut filled = 0;
        while filled < probe.len() {
            let n = reader.read(&mut probe[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        probe.truncate(filled);

        let delimiter = match config.delimiter {
            Some(c) if c.is_ascii() => c as u8,
            Some(c) => {
                return Err(ImportError::ProviderInit(format!(
                    "delimiter must be ASCII, got {:?}",
                    c
                )))
            }
            None => sniff_delimiter(&probe),
        };

        let source: Box<dyn Read + Send> = Box::new(std::io::Cursor::new(probe).chain(reader));
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(source);

        let mut initial: Vec<Vec<String>> = Vec::new();
        let mut record = csv::StringRecord::new();
        while initial.len() < INITIAL_RECORDS {
            match csv_reader.read_record(&mut record) {
                Ok(true) => initial.push(record.iter().map(str::to_string).collect()),
                Ok(false) => break,
                Err(e) => return Err(ImportError::ProviderInit(format!("csv: {}", e))),
            }
        }

        let header_index = if config.advanced_header_detection {
            detect_header_row(&initial[..initial.len().min(10)])
        } else {
            0
        };
        debug!("delimited header row at index {}", header_index);

        let raw_headers = initial.get(header_index).cloned().unwrap_or_default();
        let headers = sanitize_identifiers(&raw_headers, COLUMN_PREFIX);

        let buffered: Vec<Row> = initial
            .into_iter()
            .skip(header_index + 1)
            .map(cells_to_row)
            .collect();
        let types = infer_column_types(sample_window(&buffered), headers.len());

        Ok(Self {
            table: config.resolved_table_name(),
            headers,
            types,
            state: Mutex::new(Some(ScanState {
                buffered,
                reader: csv_reader,
            })),
        })
    }
}

#[async_trait]
impl RowProvider for DelimitedProvider {
    fn table_names(&self) -> Vec<String> {
        vec![self.table.clone()]
    }

    fn headers(&self, _table: &str) -> Vec<String> {
        self.headers.clone()
    }

    fn column_types(&self, _table: &str) -> Vec<ColumnType> {
        self.types.clone()
    }

    async fn scan_rows(&self, ctx: &ScanContext, _table: &str) -> Result<RowStream> {
        let state = self
            .state
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ImportError::ScanProducer("source already consumed".to_string()))?;

        let (tx, stream) = RowStream::channel();
        let ctx = ctx.clone();
        tokio::task::spawn_blocking(move || {
            let ScanState {
                buffered,
                mut reader,
            } = state;

            for row in buffered {
                if !blocking_send_item(&ctx, &tx, Ok(row)) {
                    return;
                }
            }

            let mut record = csv::StringRecord::new();
            loop {
                match reader.read_record(&mut record) {
                    Ok(true) => {
                        let row = record.iter().map(|s| Value::Text(s.to_string())).collect();
                        if !blocking_send_item(&ctx, &tx, Ok(row)) {
                            return;
                        }
                    }
                    Ok(false) => return,
                    Err(e) => {
                        let err = RowError::new(format!("csv: {}", e));
                        if !blocking_send_item(&ctx, &tx, Err(err)) {
                            return;
                        }
                    }
                }
            }
        });
        Ok(stream)
    }
}

fn cells_to_row(cells: Vec<String>) -> Row {
    cells.into_iter().map(Value::Text).collect()
}

/// Pick the most frequent candidate delimiter in the probe window; ties
/// favor the comma through candidate order and strict comparison.
fn sniff_delimiter(probe: &[u8]) -> u8 {
    let mut best = b',';
    let mut best_count = 0usize;
    for &candidate in DELIMITER_CANDIDATES {
        let count = probe.iter().filter(|&&b| b == candidate).count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider_for(data: &str, config: &ImportConfig) -> DelimitedProvider {
        let reader: SourceReader = Box::new(std::io::Cursor::new(data.to_string().into_bytes()));
        DelimitedProvider::from_reader(reader, config).unwrap()
    }

    async fn collect_rows(provider: &DelimitedProvider) -> Vec<Row> {
        let ctx = ScanContext::background();
        let stream = provider.scan_rows(&ctx, "tb0").await.unwrap();
        let mut rx = stream.receiver;
        let mut rows = Vec::new();
        while let Some(item) = rx.recv().await {
            rows.push(item.unwrap());
        }
        rows
    }

    #[test]
    fn test_sniff_comma() {
        assert_eq!(sniff_delimiter(b"a,b,c\n1,2,3\n"), b',');
    }

    #[test]
    fn test_sniff_tab() {
        assert_eq!(sniff_delimiter(b"a\tb\tc\n1\t2\t3\n"), b'\t');
    }

    #[test]
    fn test_sniff_tie_favors_comma() {
        assert_eq!(sniff_delimiter(b"a,b;c\n"), b',');
        assert_eq!(sniff_delimiter(b""), b',');
    }

    #[tokio::test]
    async fn test_csv_happy_path() {
        let provider = provider_for(
            "Name,Age,City\nJohn,25,New York\nJane,30,London\nBob,35,Paris\n",
            &ImportConfig::default(),
        );
        assert_eq!(provider.table_names(), vec!["tb0"]);
        assert_eq!(provider.headers("tb0"), vec!["name", "age", "city"]);
        assert_eq!(
            provider.column_types("tb0"),
            vec![ColumnType::Text, ColumnType::Integer, ColumnType::Text]
        );

        let rows = collect_rows(&provider).await;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0], Value::Text("John".to_string()));
        assert_eq!(rows[2][2], Value::Text("Paris".to_string()));
    }

    #[tokio::test]
    async fn test_streams_past_the_buffered_prefix() {
        let mut data = String::from("id,score\n");
        for i in 0..200 {
            data.push_str(&format!("{},{}\n", i, i * 2));
        }
        let provider = provider_for(&data, &ImportConfig::default());
        let rows = collect_rows(&provider).await;
        assert_eq!(rows.len(), 200);
        assert_eq!(rows[199][0], Value::Text("199".to_string()));
    }

    #[tokio::test]
    async fn test_advanced_header_detection_skips_preamble() {
        let config = ImportConfig {
            advanced_header_detection: true,
            ..Default::default()
        };
        let provider = provider_for(
            "Report generated 2024-01-01\n\nName,Age,City\nJohn,25,New York\nJane,30,London\n",
            &config,
        );
        assert_eq!(provider.headers("tb0"), vec!["name", "age", "city"]);
        let rows = collect_rows(&provider).await;
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_explicit_delimiter() {
        let config = ImportConfig {
            delimiter: Some(';'),
            ..Default::default()
        };
        let provider = provider_for("a;b\n1;2\n", &config);
        assert_eq!(provider.headers("tb0"), vec!["a", "b"]);
        let rows = collect_rows(&provider).await;
        assert_eq!(rows, vec![vec![
            Value::Text("1".to_string()),
            Value::Text("2".to_string()),
        ]]);
    }

    #[test]
    fn test_empty_source_has_no_headers() {
        let provider = provider_for("", &ImportConfig::default());
        assert!(provider.headers("tb0").is_empty());
    }

    #[test]
    fn test_second_scan_fails() {
        let provider = provider_for("a\n1\n", &ImportConfig::default());
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let ctx = ScanContext::background();
            let first = provider.scan_rows(&ctx, "tb0").await;
            assert!(first.is_ok());
            let second = provider.scan_rows(&ctx, "tb0").await;
            assert!(second.is_err());
        });
    }
}
