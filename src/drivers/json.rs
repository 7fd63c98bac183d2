//! JSON document driver.
//!
//! Accepts a top-level array of objects (the common export shape) and
//! treats a single object as a one-row array. Column order follows the
//! first appearance of each key across the document, which serde_json's
//! `preserve_order` feature keeps stable. Nested objects and arrays are
//! re-serialized to compact JSON text and land in TEXT columns.

use std::io::Read;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::types::Value;

use crate::config::ImportConfig;
use crate::error::{ImportError, Result};
use crate::identifier::{sanitize_identifiers, COLUMN_PREFIX};
use crate::inference::{infer_column_types, sample_window, ColumnType};
use crate::provider::{replay_rows, Row, RowProvider, RowStream};
use crate::registry::SourceReader;
use crate::scan::ScanContext;

/// Column name used when the document is not made of objects.
const SCALAR_COLUMN: &str = "value";

pub struct JsonProvider {
    table: String,
    headers: Vec<String>,
    types: Vec<ColumnType>,
    rows: Mutex<Option<Vec<Row>>>,
}

/// Driver factory registered under `json`.
pub fn factory(mut reader: SourceReader, config: &ImportConfig) -> Result<Box<dyn RowProvider>> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    let document: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| ImportError::ProviderInit(format!("json: {}", e)))?;
    Ok(Box::new(JsonProvider::from_document(document, config)))
}

impl JsonProvider {
    fn from_document(document: serde_json::Value, config: &ImportConfig) -> Self {
        let items = match document {
            serde_json::Value::Array(items) => items,
            other => vec![other],
        };

        // Header order is first-seen key order across all objects; a
        // non-object anywhere demotes the document to a single column.
        let mut raw_headers: Vec<String> = Vec::new();
        let all_objects = items.iter().all(|item| item.is_object());
        if all_objects && !items.is_empty() {
            for item in &items {
                if let serde_json::Value::Object(map) = item {
                    for key in map.keys() {
                        if !raw_headers.iter().any(|h| h == key) {
                            raw_headers.push(key.clone());
                        }
                    }
                }
            }
        } else if !items.is_empty() {
            raw_headers.push(SCALAR_COLUMN.to_string());
        }

        let rows: Vec<Row> = if all_objects {
            items
                .into_iter()
                .map(|item| {
                    let mut map = match item {
                        serde_json::Value::Object(map) => map,
                        _ => serde_json::Map::new(),
                    };
                    raw_headers
                        .iter()
                        .map(|key| match map.remove(key) {
                            Some(v) => json_to_value(v),
                            None => Value::Null,
                        })
                        .collect()
                })
                .collect()
        } else {
            items.into_iter().map(|item| vec![json_to_value(item)]).collect()
        };

        let headers = sanitize_identifiers(&raw_headers, COLUMN_PREFIX);
        let types = infer_column_types(sample_window(&rows), headers.len());

        Self {
            table: config.resolved_table_name(),
            headers,
            types,
            rows: Mutex::new(Some(rows)),
        }
    }
}

#[async_trait]
impl RowProvider for JsonProvider {
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
        let rows = self
            .rows
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ImportError::ScanProducer("source already consumed".to_string()))?;
        Ok(replay_rows(ctx, rows))
    }
}

/// Map a JSON scalar onto the value model; compound values serialize to
/// compact text.
fn json_to_value(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Integer(b as i64),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else if let Some(f) = n.as_f64() {
                Value::Real(f)
            } else {
                Value::Text(n.to_string())
            }
        }
        serde_json::Value::String(s) => Value::Text(s),
        compound => Value::Text(serde_json::to_string(&compound).unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider_for(json: &str) -> JsonProvider {
        let document = serde_json::from_str(json).unwrap();
        JsonProvider::from_document(document, &ImportConfig::default())
    }

    async fn collect_rows(provider: &JsonProvider) -> Vec<Row> {
        let ctx = ScanContext::background();
        let mut rx = provider.scan_rows(&ctx, "tb0").await.unwrap().receiver;
        let mut rows = Vec::new();
        while let Some(item) = rx.recv().await {
            rows.push(item.unwrap());
        }
        rows
    }

    #[tokio::test]
    async fn test_array_of_objects() {
        let provider = provider_for(
            r#"[{"name": "John", "age": 25}, {"name": "Jane", "age": 30, "city": "London"}]"#,
        );
        assert_eq!(provider.headers("tb0"), vec!["name", "age", "city"]);
        assert_eq!(
            provider.column_types("tb0"),
            vec![ColumnType::Text, ColumnType::Integer, ColumnType::Text]
        );

        let rows = collect_rows(&provider).await;
        assert_eq!(rows.len(), 2);
        // Missing keys null-fill.
        assert_eq!(rows[0][2], Value::Null);
        assert_eq!(rows[1][2], Value::Text("London".to_string()));
    }

    #[tokio::test]
    async fn test_nested_values_serialize_to_text() {
        let provider = provider_for(r#"[{"id": 1, "tags": ["a", "b"], "meta": {"x": 1}}]"#);
        let rows = collect_rows(&provider).await;
        assert_eq!(rows[0][1], Value::Text(r#"["a","b"]"#.to_string()));
        assert_eq!(rows[0][2], Value::Text(r#"{"x":1}"#.to_string()));
        assert_eq!(
            provider.column_types("tb0"),
            vec![ColumnType::Integer, ColumnType::Text, ColumnType::Text]
        );
    }

    #[tokio::test]
    async fn test_single_object_is_one_row() {
        let provider = provider_for(r#"{"a": 1, "b": true}"#);
        let rows = collect_rows(&provider).await;
        assert_eq!(rows, vec![vec![Value::Integer(1), Value::Integer(1)]]);
    }

    #[tokio::test]
    async fn test_scalar_array_uses_value_column() {
        let provider = provider_for(r#"[1, 2.5, "x"]"#);
        assert_eq!(provider.headers("tb0"), vec!["value"]);
        let rows = collect_rows(&provider).await;
        assert_eq!(rows[0], vec![Value::Integer(1)]);
        assert_eq!(rows[1], vec![Value::Real(2.5)]);
        assert_eq!(rows[2], vec![Value::Text("x".to_string())]);
    }

    #[test]
    fn test_empty_array_has_no_headers() {
        let provider = provider_for("[]");
        assert!(provider.headers("tb0").is_empty());
    }
}
