//! Process-global driver registry.
//!
//! A driver is a named factory that builds a [`RowProvider`] from a source
//! reader and a configuration. Registration happens once during process
//! initialization; lookups are read-locked and cheap.

use std::collections::HashMap;
use std::io::Read;
use std::sync::{OnceLock, RwLock};

use crate::config::ImportConfig;
use crate::error::{ImportError, Result};
use crate::provider::RowProvider;

/// Source handed to a driver factory. Drivers that need random access
/// (spreadsheets, archives) buffer it; the filesystem driver ignores it and
/// uses `config.input_path`.
pub type SourceReader = Box<dyn Read + Send>;

/// Factory signature for a registered driver.
pub type DriverFactory = fn(SourceReader, &ImportConfig) -> Result<Box<dyn RowProvider>>;

fn registry() -> &'static RwLock<HashMap<String, DriverFactory>> {
    static REGISTRY: OnceLock<RwLock<HashMap<String, DriverFactory>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Register a driver under a unique name. Fails if the name is already
/// bound.
pub fn register(name: &str, factory: DriverFactory) -> Result<()> {
    let mut drivers = registry().write().unwrap();
    if drivers.contains_key(name) {
        return Err(ImportError::DriverExists(name.to_string()));
    }
    drivers.insert(name.to_string(), factory);
    Ok(())
}

/// Construct a provider through a registered driver.
pub fn open(name: &str, reader: SourceReader, config: &ImportConfig) -> Result<Box<dyn RowProvider>> {
    let factory = registry()
        .read()
        .unwrap()
        .get(name)
        .copied()
        .ok_or_else(|| ImportError::UnknownDriver(name.to_string()))?;
    factory(reader, config)
}

/// Sorted names of all registered drivers.
pub fn drivers() -> Vec<String> {
    let mut names: Vec<String> = registry().read().unwrap().keys().cloned().collect();
    names.sort();
    names
}
