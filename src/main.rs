//! mksqlite - materialize tabular and semi-structured files into SQLite.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize logging based on verbosity. Logs go to stderr; stdout may
    // be carrying a SQL script.
    let default_filter = if mksqlite::cli::is_verbose() {
        "mksqlite=info"
    } else {
        "mksqlite=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = mksqlite::cli::run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
