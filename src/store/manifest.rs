//! Sidecar metadata written next to every extract file.
//!
//! The manifest records the table the extract holds, its column definitions
//! and a SHA-256 of the data file, so readers can tell a complete extract
//! from a truncated or foreign one.

use crate::ports::{ColumnDefinition, TableRef};
use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fs::File;
use std::io::{BufReader, Read as _};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Buffer size for streaming file reads (8 KB).
const BUFFER_SIZE: usize = 8192;

pub const MANIFEST_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractManifest {
    pub format_version: u32,
    pub extract_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub table: TableRef,
    pub columns: Vec<ColumnDefinition>,
    pub row_count: usize,
    pub sha256: String,
}

impl ExtractManifest {
    /// Describes `df` as the default table of a new extract.
    ///
    /// A column is declared nullable when it still holds missing values.
    pub fn describe(name: &str, df: &DataFrame, sha256: String) -> Self {
        let columns = df
            .get_columns()
            .iter()
            .map(|c| ColumnDefinition::new(c.name().as_str(), c.dtype(), c.null_count() > 0))
            .collect();

        Self {
            format_version: MANIFEST_FORMAT_VERSION,
            extract_id: Uuid::new_v4(),
            name: name.to_owned(),
            created_at: Utc::now(),
            table: TableRef::default(),
            columns,
            row_count: df.height(),
            sha256,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize extract manifest")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse extract manifest")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("Failed to write manifest: {}", path.display()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        Self::from_json(&json)
    }

    /// Checks that `data_path` is the file this manifest was written for.
    pub fn verify(&self, data_path: &Path) -> Result<()> {
        if self.format_version != MANIFEST_FORMAT_VERSION {
            anyhow::bail!(
                "Unsupported extract format version {} (expected {MANIFEST_FORMAT_VERSION})",
                self.format_version
            );
        }
        let actual = compute_file_hash(data_path)?;
        if actual != self.sha256 {
            anyhow::bail!(
                "Extract file is corrupt: checksum mismatch for {}",
                data_path.display()
            );
        }
        Ok(())
    }
}

/// `<dir>/<name>.parquet` → `<dir>/<name>.manifest.json`
pub fn manifest_path(extract_path: &Path) -> PathBuf {
    extract_path.with_extension("manifest.json")
}

/// SHA-256 of a file as lowercase hex, read in fixed-size chunks.
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;

    let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; BUFFER_SIZE];

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    let hash = hasher.finalize();
    Ok(format!("{hash:x}"))
}
