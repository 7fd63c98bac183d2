//! CLI commands implementation.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use tracing::info;

use crate::config::ImportConfig;
use crate::drivers;
use crate::engine::ImportEngine;
use crate::registry;
use crate::scan;
use crate::stream_sql;

#[derive(Parser)]
#[command(name = "mksqlite")]
#[command(about = "Materialize tabular and semi-structured files into SQLite databases")]
#[command(version)]
pub struct Cli {
    /// Input file or directory
    input: PathBuf,

    /// Output path (default: <input>.db, or stdout with --sql)
    output: Option<PathBuf>,

    /// Emit a SQL script instead of a database file
    #[arg(long)]
    sql: bool,

    /// Override the default table identifier
    #[arg(long)]
    table_name: Option<String>,

    /// Delimiter for delimited text (default: sniffed from the source)
    #[arg(long)]
    delimiter: Option<char>,

    /// Enable header-row assessment over the first rows
    #[arg(long)]
    advanced_headers: bool,

    /// Filesystem walker resume point: skip entries sorting below this path
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Idle timeout for a scan, e.g. "20s" (default: no timeout)
    #[arg(long, value_parser = humantime::parse_duration)]
    scan_timeout: Option<Duration>,

    /// Rows per transaction
    #[arg(long, default_value_t = crate::config::DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Capture row errors in _mksqlite_errors instead of aborting
    #[arg(long)]
    log_errors: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    drivers::register_builtin();

    let driver = drivers::driver_for_path(&cli.input)?;
    let config = ImportConfig {
        table_name: cli.table_name.unwrap_or_default(),
        delimiter: cli.delimiter,
        advanced_header_detection: cli.advanced_headers,
        input_path: Some(cli.input.clone()),
        resume_path: cli.resume,
        scan_timeout: cli.scan_timeout,
        batch_size: cli.batch_size,
        log_errors: cli.log_errors,
    };

    // The filesystem driver walks input_path; everything else streams the
    // opened file.
    let reader: registry::SourceReader = if driver == "filesystem" {
        Box::new(std::io::empty())
    } else {
        Box::new(File::open(&cli.input)?)
    };
    let provider = registry::open(driver, reader, &config)?;

    if cli.sql {
        // Signals cancel between rows; there is no watchdog on this path.
        let (ctx, _guard) = scan::compose(None, None);
        match &cli.output {
            Some(path) => {
                let mut out = std::io::BufWriter::new(File::create(path)?);
                stream_sql::write_script(provider.as_ref(), &ctx, &config, &mut out).await?;
            }
            None => {
                let stdout = std::io::stdout();
                let mut out = stdout.lock();
                stream_sql::write_script(provider.as_ref(), &ctx, &config, &mut out).await?;
            }
        }
    } else {
        let output = cli
            .output
            .clone()
            .unwrap_or_else(|| default_db_path(&cli.input));
        let engine = ImportEngine::new(config);
        engine.import_to_path(provider.as_ref(), &output).await?;
        info!("wrote {}", output.display());
    }
    Ok(())
}

fn default_db_path(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_owned();
    name.push(".db");
    PathBuf::from(name)
}
