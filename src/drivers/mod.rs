//! Built-in format drivers and input-path driver selection.

use std::path::Path;
use std::sync::Once;

use tracing::debug;

use crate::error::{ImportError, Result};
use crate::registry;

pub mod archive;
pub mod delimited;
pub mod filesystem;
pub mod html;
pub mod json;
pub mod spreadsheet;
pub mod text;

/// Register every built-in driver. Safe to call more than once.
pub fn register_builtin() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        let builtin: &[(&str, registry::DriverFactory)] = &[
            ("csv", delimited::factory),
            ("xlsx", spreadsheet::factory),
            ("html", html::factory),
            ("json", json::factory),
            ("txt", text::factory),
            ("zip", archive::factory),
            ("filesystem", filesystem::factory),
        ];
        for (name, factory) in builtin {
            if let Err(e) = registry::register(name, *factory) {
                debug!("driver {} not registered: {}", name, e);
            }
        }
    });
}

/// Infer the driver name from an input path: directories walk the
/// filesystem, files map by extension.
pub fn driver_for_path(path: &Path) -> Result<&'static str> {
    if path.is_dir() {
        return Ok("filesystem");
    }
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "csv" => Ok("csv"),
        "xlsx" | "xls" => Ok("xlsx"),
        "zip" => Ok("zip"),
        "html" | "htm" => Ok("html"),
        "json" => Ok("json"),
        "txt" => Ok("txt"),
        _ => Err(ImportError::UnsupportedType(path.display().to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_extension_mapping() {
        assert_eq!(driver_for_path(&PathBuf::from("a.csv")).unwrap(), "csv");
        assert_eq!(driver_for_path(&PathBuf::from("a.XLSX")).unwrap(), "xlsx");
        assert_eq!(driver_for_path(&PathBuf::from("a.xls")).unwrap(), "xlsx");
        assert_eq!(driver_for_path(&PathBuf::from("a.htm")).unwrap(), "html");
        assert_eq!(driver_for_path(&PathBuf::from("a.json")).unwrap(), "json");
        assert_eq!(driver_for_path(&PathBuf::from("a.txt")).unwrap(), "txt");
        assert_eq!(driver_for_path(&PathBuf::from("a.zip")).unwrap(), "zip");
    }

    #[test]
    fn test_unknown_extension() {
        let err = driver_for_path(&PathBuf::from("a.parquet")).unwrap_err();
        assert!(matches!(err, ImportError::UnsupportedType(_)));
    }

    #[test]
    fn test_directory_maps_to_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(driver_for_path(dir.path()).unwrap(), "filesystem");
    }

    #[test]
    fn test_register_builtin_is_idempotent() {
        register_builtin();
        register_builtin();
        let names = registry::drivers();
        for expected in ["csv", "xlsx", "html", "json", "txt", "zip", "filesystem"] {
            assert!(names.iter().any(|n| n == expected), "missing {}", expected);
        }
    }
}
