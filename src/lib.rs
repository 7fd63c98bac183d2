//! mksqlite - streaming import of heterogeneous sources into SQLite.
//!
//! The crate materializes delimited text, spreadsheets, HTML tables, JSON
//! documents, plain text, ZIP archives, and filesystem trees into a SQLite
//! database or an equivalent SQL script. Format drivers plug into a common
//! row-provider contract; the import engine drives any provider through
//! batched transactional inserts with bounded memory, cooperative
//! cancellation, and an inactivity watchdog.

pub mod cli;
pub mod config;
pub mod drivers;
pub mod engine;
pub mod error;
pub mod identifier;
pub mod inference;
pub mod provider;
pub mod registry;
pub mod scan;
pub mod sql;
pub mod stream_sql;
pub mod watchdog;

pub use config::ImportConfig;
pub use engine::ImportEngine;
pub use error::{ImportError, Result};
