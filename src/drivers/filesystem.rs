//! Concurrent filesystem walker driver.
//!
//! A bounded worker pool scans directory trees: a semaphore slot is
//! acquired before every spawn, so queue depth stays bounded by the pool
//! width plus the row channel's capacity no matter how broad a directory
//! is. Directory reads and per-file MIME sniffs carry their own wall
//! timeouts to survive unresponsive mounts, and an optional resume point
//! skips everything a previous scan already covered.

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::{BoxFuture, FutureExt};
use rusqlite::types::Value;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tracing::warn;

use crate::config::ImportConfig;
use crate::error::{ImportError, Result};
use crate::inference::ColumnType;
use crate::provider::{send_item, Row, RowError, RowItem, RowProvider, RowStream};
use crate::registry::SourceReader;
use crate::scan::ScanContext;

/// Width of the worker pool gating directory and file work.
const WORKER_POOL_SIZE: usize = 32;

/// Wall timeout around each directory read.
const DIR_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Wall timeout around each per-file MIME sniff.
const MIME_SNIFF_TIMEOUT: Duration = Duration::from_secs(5);

/// Bytes read from a file head for content-type detection.
const MIME_SNIFF_BYTES: usize = 512;

const DIRECTORY_MIME: &str = "inode/directory";
const FALLBACK_MIME: &str = "application/octet-stream";

const HEADERS: &[&str] = &[
    "path",
    "name",
    "size",
    "extension",
    "mod_time",
    "create_time",
    "permissions",
    "is_dir",
    "mime_type",
];

const TYPES: &[ColumnType] = &[
    ColumnType::Text,
    ColumnType::Text,
    ColumnType::Integer,
    ColumnType::Text,
    ColumnType::Text,
    ColumnType::Text,
    ColumnType::Text,
    ColumnType::Integer,
    ColumnType::Text,
];

pub struct FilesystemProvider {
    root: PathBuf,
    table: String,
    resume: Option<String>,
    log_errors: bool,
    mime_timeout: Duration,
}

/// Driver factory registered under `filesystem`. Ignores the reader and
/// walks `config.input_path`.
pub fn factory(_reader: SourceReader, config: &ImportConfig) -> Result<Box<dyn RowProvider>> {
    Ok(Box::new(FilesystemProvider::from_config(config)?))
}

impl FilesystemProvider {
    pub fn from_config(config: &ImportConfig) -> Result<Self> {
        let root = config.input_path.clone().ok_or_else(|| {
            ImportError::ProviderInit("filesystem driver requires input_path".to_string())
        })?;
        if !root.is_dir() {
            return Err(ImportError::ProviderInit(format!(
                "not a directory: {}",
                root.display()
            )));
        }

        // Per-file reads never outlive the scan's own idle budget.
        let mime_timeout = match config.scan_timeout {
            Some(t) if !t.is_zero() && t < MIME_SNIFF_TIMEOUT => t,
            _ => MIME_SNIFF_TIMEOUT,
        };

        Ok(Self {
            root,
            table: config.resolved_table_name(),
            resume: config
                .resume_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            log_errors: config.log_errors,
            mime_timeout,
        })
    }
}

struct WalkState {
    root: PathBuf,
    resume: Option<String>,
    log_errors: bool,
    mime_timeout: Duration,
    semaphore: Arc<Semaphore>,
    ctx: ScanContext,
}

impl WalkState {
    /// Resume support: entries whose full path sorts below the resume
    /// point were covered by a previous scan.
    fn skipped(&self, path: &Path) -> bool {
        match &self.resume {
            Some(resume) => path.to_string_lossy().as_ref() < resume.as_str(),
            None => false,
        }
    }
}

#[async_trait]
impl RowProvider for FilesystemProvider {
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
        let (tx, stream) = RowStream::channel();
        let state = Arc::new(WalkState {
            root: self.root.clone(),
            resume: self.resume.clone(),
            log_errors: self.log_errors,
            mime_timeout: self.mime_timeout,
            semaphore: Arc::new(Semaphore::new(WORKER_POOL_SIZE)),
            ctx: ctx.clone(),
        });

        let root = self.root.clone();
        tokio::spawn(async move {
            let permit = match state.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            walk_dir(state, root, tx, permit).await;
        });
        Ok(stream)
    }
}

/// Process one directory: read and sort its entries under the held slot,
/// emit rows, then recurse. Slots are released before children request
/// their own, so the pool can never deadlock on deep trees; the channel's
/// backpressure still bounds how far the walk runs ahead of the consumer.
fn walk_dir(
    state: Arc<WalkState>,
    dir: PathBuf,
    tx: mpsc::Sender<RowItem>,
    permit: OwnedSemaphorePermit,
) -> BoxFuture<'static, ()> {
    async move {
        if state.ctx.stop_reason().is_some() {
            return;
        }

        let entries = match read_dir_sorted(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                report_dir_error(&state, &tx, &dir, &e).await;
                return;
            }
        };
        drop(permit);

        let mut subdirs = Vec::new();
        for (path, meta) in entries {
            if state.ctx.stop_reason().is_some() {
                return;
            }
            if meta.is_dir() {
                if !state.skipped(&path) {
                    let row = entry_row(&state, &path, &meta, DIRECTORY_MIME.to_string());
                    if !send_item(&state.ctx, &tx, Ok(row)).await {
                        return;
                    }
                }
                subdirs.push(path);
            } else {
                if state.skipped(&path) {
                    continue;
                }
                let file_permit = match state.semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                let file_state = Arc::clone(&state);
                let file_tx = tx.clone();
                tokio::spawn(async move {
                    let _permit = file_permit;
                    let mime = sniff_mime(&file_state, &path).await;
                    let row = entry_row(&file_state, &path, &meta, mime);
                    let _ = send_item(&file_state.ctx, &file_tx, Ok(row)).await;
                });
            }
        }

        for sub in subdirs {
            let sub_permit = match state.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            tokio::spawn(walk_dir(Arc::clone(&state), sub, tx.clone(), sub_permit));
        }
    }
    .boxed()
}

/// Read and sort a directory's entries, bounded by [`DIR_READ_TIMEOUT`].
/// Entries whose metadata cannot be read are skipped with a warning.
async fn read_dir_sorted(dir: &Path) -> std::io::Result<Vec<(PathBuf, Metadata)>> {
    let dir = dir.to_path_buf();
    let work = tokio::task::spawn_blocking(move || -> std::io::Result<Vec<(PathBuf, Metadata)>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            match entry.metadata() {
                Ok(meta) => out.push((entry.path(), meta)),
                Err(e) => warn!("skipping {}: {}", entry.path().display(), e),
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    });

    match tokio::time::timeout(DIR_READ_TIMEOUT, work).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(std::io::Error::other(join_err)),
        Err(_) => Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "directory read timed out",
        )),
    }
}

/// Recoverable directory failures (permissions, dead mounts) skip the
/// subtree. In log mode they surface through the error-log table; the walk
/// itself continues either way.
async fn report_dir_error(
    state: &WalkState,
    tx: &mpsc::Sender<RowItem>,
    dir: &Path,
    err: &std::io::Error,
) {
    if state.log_errors {
        let row_err = RowError::with_row(
            format!("read dir {}: {}", dir.display(), err),
            dir.to_string_lossy(),
        );
        let _ = send_item(&state.ctx, tx, Err(row_err)).await;
    } else {
        warn!("skipping directory {}: {}", dir.display(), err);
    }
}

fn entry_row(state: &WalkState, path: &Path, meta: &Metadata, mime: String) -> Row {
    let rel = path.strip_prefix(&state.root).unwrap_or(path);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let modified = meta.modified().ok();
    // Not every filesystem records a birth time.
    let created = meta.created().ok().or(modified);

    vec![
        Value::Text(rel.to_string_lossy().into_owned()),
        Value::Text(name),
        Value::Integer(meta.len() as i64),
        Value::Text(extension),
        Value::Text(format_time(modified)),
        Value::Text(format_time(created)),
        Value::Text(permissions_string(meta)),
        Value::Integer(meta.is_dir() as i64),
        Value::Text(mime),
    ]
}

fn format_time(time: Option<SystemTime>) -> String {
    time.map(|t| DateTime::<Utc>::from(t).to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

#[cfg(unix)]
fn permissions_string(meta: &Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;
    format!("{:o}", meta.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn permissions_string(meta: &Metadata) -> String {
    if meta.permissions().readonly() {
        "ro".to_string()
    } else {
        "rw".to_string()
    }
}

/// Content-type detection: read the file head under the per-file timeout,
/// try magic bytes, then the extension, then give up.
async fn sniff_mime(state: &WalkState, path: &Path) -> String {
    match tokio::time::timeout(state.mime_timeout, read_prefix(path)).await {
        Ok(Ok(buf)) => infer::get(&buf)
            .map(|kind| kind.mime_type().to_string())
            .or_else(|| {
                mime_guess::from_path(path)
                    .first()
                    .map(|m| m.essence_str().to_string())
            })
            .unwrap_or_else(|| FALLBACK_MIME.to_string()),
        _ => FALLBACK_MIME.to_string(),
    }
}

async fn read_prefix(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut buf = vec![0u8; MIME_SNIFF_BYTES];
    let n = file.read(&mut buf).await?;
    buf.truncate(n);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn write_tree(root: &Path) {
        std::fs::create_dir(root.join("sub")).unwrap();
        std::fs::write(root.join("alpha.txt"), b"hello world").unwrap();
        std::fs::write(root.join("sub/beta.json"), b"{\"a\": 1}").unwrap();
    }

    async fn scan_to_map(provider: &FilesystemProvider) -> HashMap<String, Row> {
        let ctx = ScanContext::background();
        let mut rx = provider.scan_rows(&ctx, "tb0").await.unwrap().receiver;
        let mut rows = HashMap::new();
        while let Some(item) = rx.recv().await {
            let row = item.unwrap();
            let path = match &row[0] {
                Value::Text(p) => p.clone(),
                other => panic!("path column should be text, got {:?}", other),
            };
            rows.insert(path, row);
        }
        rows
    }

    fn provider_for(root: &Path, config: ImportConfig) -> FilesystemProvider {
        let config = ImportConfig {
            input_path: Some(root.to_path_buf()),
            ..config
        };
        FilesystemProvider::from_config(&config).unwrap()
    }

    #[tokio::test]
    async fn test_walk_emits_all_entries() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path());
        let provider = provider_for(dir.path(), ImportConfig::default());

        let rows = scan_to_map(&provider).await;
        assert_eq!(rows.len(), 3);

        let sub = &rows["sub"];
        assert_eq!(sub[7], Value::Integer(1));
        assert_eq!(sub[8], Value::Text(DIRECTORY_MIME.to_string()));

        let alpha = &rows["alpha.txt"];
        assert_eq!(alpha[1], Value::Text("alpha.txt".to_string()));
        assert_eq!(alpha[2], Value::Integer(11));
        assert_eq!(alpha[3], Value::Text("txt".to_string()));
        assert_eq!(alpha[7], Value::Integer(0));

        let beta = &rows["sub/beta.json"];
        assert_eq!(beta[3], Value::Text("json".to_string()));
    }

    #[tokio::test]
    async fn test_resume_skips_earlier_paths() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path());
        let config = ImportConfig {
            resume_path: Some(dir.path().join("sub")),
            ..Default::default()
        };
        let provider = provider_for(dir.path(), config);

        let rows = scan_to_map(&provider).await;
        // "alpha.txt" sorts below "sub" and was covered by the earlier run.
        assert!(!rows.contains_key("alpha.txt"));
        assert!(rows.contains_key("sub"));
        assert!(rows.contains_key("sub/beta.json"));
    }

    #[tokio::test]
    async fn test_cancelled_scan_stops() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path());
        let provider = provider_for(dir.path(), ImportConfig::default());

        let (ctx, handle) = ScanContext::new();
        handle.cancel(crate::scan::StopReason::Interrupted);
        let mut rx = provider.scan_rows(&ctx, "tb0").await.unwrap().receiver;

        let mut count = 0;
        while rx.recv().await.is_some() {
            count += 1;
        }
        assert!(count <= 3, "cancelled walk should not emit a full scan");
    }

    #[test]
    fn test_factory_requires_directory() {
        let err = factory(Box::new(std::io::empty()), &ImportConfig::default()).err().unwrap();
        assert!(matches!(err, ImportError::ProviderInit(_)));
    }

    #[tokio::test]
    async fn test_timestamps_are_rfc3339() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f"), b"x").unwrap();
        let provider = provider_for(dir.path(), ImportConfig::default());
        let rows = scan_to_map(&provider).await;
        let row = &rows["f"];
        match (&row[4], &row[5]) {
            (Value::Text(modified), Value::Text(created)) => {
                assert!(DateTime::parse_from_rfc3339(modified).is_ok(), "{}", modified);
                assert!(DateTime::parse_from_rfc3339(created).is_ok(), "{}", created);
            }
            other => panic!("expected text timestamps, got {:?}", other),
        }
    }
}
