//! Persistent settings for extract creation and publishing.
//!
//! Settings live in `config.json` under the platform config directory and
//! can be overridden with an explicit file. Credentials never go through
//! here: passwords are passed per call as [`secrecy::SecretString`].

use crate::error::{HyperleaupError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Rows shown by a preview when the caller does not ask for a limit.
pub const DEFAULT_PREVIEW_ROW_LIMIT: usize = 1000;

/// Files above this size are uploaded in chunks (Tableau's single-request cap).
pub const DEFAULT_CHUNK_SIZE_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TableauSettings {
    /// REST API version segment, e.g. `3.19` in `/api/3.19/...`
    pub api_version: String,
    /// Upload chunk size for large extracts
    pub chunk_size_bytes: u64,
    /// Per-request timeout for the HTTP client
    pub request_timeout_secs: u64,
}

impl Default for TableauSettings {
    fn default() -> Self {
        Self {
            api_version: "3.19".to_owned(),
            chunk_size_bytes: DEFAULT_CHUNK_SIZE_BYTES,
            request_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Final location of materialized extracts
    pub output_dir: PathBuf,
    /// Distributed filesystem mount used when staging is requested
    pub staging_dir: PathBuf,
    /// Default row limit for previews
    pub preview_row_limit: usize,
    pub tableau: TableauSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("extracts"),
            staging_dir: PathBuf::from("/dbfs/tmp/hyperleaup"),
            preview_row_limit: DEFAULT_PREVIEW_ROW_LIMIT,
            tableau: TableauSettings::default(),
        }
    }
}

/// Default settings file location (`<config dir>/hyperleaup/config.json`).
pub fn get_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("hyperleaup").join("config.json"))
}

/// Loads settings.
///
/// An explicit `path` must exist and parse. Without one, the default location
/// is read when present and defaults are used otherwise.
///
/// # Errors
///
/// Returns [`HyperleaupError::Configuration`] if the file cannot be read or parsed
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    if let Some(path) = path {
        return read_settings(path);
    }

    match get_config_path() {
        Some(default_path) if default_path.exists() => read_settings(&default_path),
        _ => {
            tracing::debug!("No settings file found, using defaults");
            Ok(Settings::default())
        }
    }
}

fn read_settings(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        HyperleaupError::Configuration(format!(
            "Failed to read settings file {}: {e}",
            path.display()
        ))
    })?;
    let settings = serde_json::from_str(&content)?;
    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// Writes settings as pretty JSON, creating parent directories.
///
/// # Errors
///
/// Returns [`HyperleaupError::Configuration`] if the file cannot be written
pub fn save_settings(settings: &Settings, path: &Path) -> Result<()> {
    let write = || -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        std::fs::write(path, content)
    };
    write().map_err(|e| {
        HyperleaupError::Configuration(format!(
            "Failed to write settings file {}: {e}",
            path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.preview_row_limit, 1000);
        assert_eq!(settings.tableau.api_version, "3.19");
        assert_eq!(settings.tableau.chunk_size_bytes, 64 * 1024 * 1024);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let settings = Settings {
            output_dir: dir.path().join("out"),
            preview_row_limit: 25,
            ..Settings::default()
        };
        save_settings(&settings, &path).unwrap();

        let loaded = load_settings(Some(&path)).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"tableau": {"api_version": "3.4"}}"#).unwrap();

        let loaded = load_settings(Some(&path)).unwrap();
        assert_eq!(loaded.tableau.api_version, "3.4");
        assert_eq!(loaded.tableau.request_timeout_secs, 300);
        assert_eq!(loaded.output_dir, PathBuf::from("extracts"));
    }

    #[test]
    fn test_explicit_missing_file_is_configuration_error() {
        let dir = tempdir().unwrap();
        let err = load_settings(Some(&dir.path().join("absent.json"))).unwrap_err();
        assert!(matches!(err, HyperleaupError::Configuration(_)));
    }

    #[test]
    fn test_invalid_json_is_configuration_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = load_settings(Some(&path)).unwrap_err();
        assert!(matches!(err, HyperleaupError::Configuration(_)));
    }
}
