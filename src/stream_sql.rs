//! Alternate sink: emit a DDL+DML script instead of a database file.
//!
//! Mirrors the engine's per-table flow but writes literal statements to any
//! byte sink. There are no transactions and no watchdog; statements are
//! meant for downstream execution, where the executing tool owns batching.

use std::io::Write;

use rusqlite::types::Value;
use tracing::warn;

use crate::config::ImportConfig;
use crate::error::{ImportError, Result};
use crate::provider::RowProvider;
use crate::scan::ScanContext;
use crate::sql;

/// Write `CREATE TABLE` and `INSERT` statements for every table the
/// provider declares.
///
/// Cancellation is checked between rows. In log mode, per-row errors are
/// logged and skipped (there is no database to hold an error table); in
/// strict mode the first per-row error aborts.
pub async fn write_script<W: Write>(
    provider: &dyn RowProvider,
    ctx: &ScanContext,
    config: &ImportConfig,
    out: &mut W,
) -> Result<()> {
    for table in provider.table_names() {
        write_table(provider, ctx, config, &table, out).await?;
    }
    out.flush()?;
    Ok(())
}

async fn write_table<W: Write>(
    provider: &dyn RowProvider,
    ctx: &ScanContext,
    config: &ImportConfig,
    table: &str,
    out: &mut W,
) -> Result<()> {
    let headers = provider.headers(table);
    if headers.is_empty() {
        return Ok(());
    }
    let mut types = provider.column_types(table);
    types.resize(headers.len(), crate::inference::ColumnType::Text);

    writeln!(out, "{};", sql::create_table(table, &headers, &types))?;

    let stream = provider.scan_rows(ctx, table).await?;
    let mut rx = stream.receiver;

    loop {
        tokio::select! {
            reason = ctx.cancelled() => return Err(reason.into_error()),
            item = rx.recv() => match item {
                None => break,
                Some(Ok(mut row)) => {
                    row.resize(headers.len(), Value::Null);
                    writeln!(out, "{}", sql::insert_literals(table, &headers, &row))?;
                }
                Some(Err(row_err)) => {
                    if config.log_errors {
                        warn!("skipping row in {}: {}", table, row_err.message);
                    } else {
                        return Err(ImportError::ScanProducer(row_err.message));
                    }
                }
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::ColumnType;
    use crate::provider::{replay_rows, RowStream};
    use async_trait::async_trait;

    struct FixedProvider;

    #[async_trait]
    impl RowProvider for FixedProvider {
        fn table_names(&self) -> Vec<String> {
            vec!["tb0".to_string()]
        }

        fn headers(&self, _table: &str) -> Vec<String> {
            vec!["name".to_string(), "age".to_string()]
        }

        fn column_types(&self, _table: &str) -> Vec<ColumnType> {
            vec![ColumnType::Text, ColumnType::Integer]
        }

        async fn scan_rows(&self, ctx: &ScanContext, _table: &str) -> Result<RowStream> {
            Ok(replay_rows(
                ctx,
                vec![
                    vec![Value::Text("O'Brien".to_string()), Value::Integer(44)],
                    vec![Value::Text("Jane".to_string()), Value::Null],
                    // Short row, padded by the emitter.
                    vec![Value::Text("Bob".to_string())],
                ],
            ))
        }
    }

    #[tokio::test]
    async fn test_script_output() {
        let mut out = Vec::new();
        let ctx = ScanContext::background();
        write_script(&FixedProvider, &ctx, &ImportConfig::default(), &mut out)
            .await
            .unwrap();

        let script = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = script.lines().collect();
        assert_eq!(lines[0], "CREATE TABLE tb0 (name TEXT, age INTEGER);");
        assert_eq!(
            lines[1],
            "INSERT INTO tb0 (name, age) VALUES ('O''Brien', 44);"
        );
        assert_eq!(lines[2], "INSERT INTO tb0 (name, age) VALUES ('Jane', NULL);");
        assert_eq!(lines[3], "INSERT INTO tb0 (name, age) VALUES ('Bob', NULL);");
    }

    #[tokio::test]
    async fn test_cancelled_scan_returns_sentinel() {
        let (parent, handle) = ScanContext::new();
        handle.cancel(crate::scan::StopReason::Interrupted);

        let mut out = Vec::new();
        let err = write_script(&FixedProvider, &parent, &ImportConfig::default(), &mut out)
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::Interrupted));
    }
}
