//! Extract files on local or mounted storage.
//!
//! An extract is a Parquet file holding the default `"Extract"."Extract"`
//! table, with an [`ExtractManifest`] next to it:
//!
//! ```text
//! extracts/
//!   sales.parquet
//!   sales.manifest.json
//! ```
//!
//! The data file and its manifest are both written under temporary names
//! and renamed into place once complete. A failed write never leaves a
//! half-written extract, or data next to another write's manifest.

pub mod manifest;

use crate::config::Settings;
use crate::ports::{ExtractReader, Materializer, TableDefinition, TableRef};
use anyhow::{Context as _, Result};
use manifest::{ExtractManifest, compute_file_hash, manifest_path};
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const EXTRACT_EXTENSION: &str = "parquet";

/// Writes and reads extract files.
#[derive(Debug, Clone)]
pub struct ExtractStore {
    output_dir: PathBuf,
    staging_dir: PathBuf,
}

impl ExtractStore {
    pub fn new(output_dir: impl Into<PathBuf>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            staging_dir: staging_dir.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.output_dir.clone(), settings.staging_dir.clone())
    }

    /// Final location of the extract called `name`.
    pub fn extract_path(&self, name: &str) -> PathBuf {
        self.output_dir.join(format!("{name}.{EXTRACT_EXTENSION}"))
    }

    /// Opens an extract for one read: the data file must exist and match its manifest.
    fn open(path: &Path) -> Result<ExtractManifest> {
        if !path.is_file() {
            anyhow::bail!("Extract file not found: {}", path.display());
        }
        let manifest = ExtractManifest::load(&manifest_path(path))
            .with_context(|| format!("Missing or unreadable manifest for {}", path.display()))?;
        manifest.verify(path)?;
        Ok(manifest)
    }

    fn check_table(manifest: &ExtractManifest, table: &TableRef) -> Result<()> {
        if &manifest.table != table {
            anyhow::bail!(
                "Table {table} not found in extract '{}' (it holds {})",
                manifest.name,
                manifest.table
            );
        }
        Ok(())
    }
}

impl Materializer for ExtractStore {
    fn materialize(&self, df: &DataFrame, name: &str, use_staging_mount: bool) -> Result<PathBuf> {
        validate_name(name)?;

        let write_dir = if use_staging_mount {
            &self.staging_dir
        } else {
            &self.output_dir
        };
        fs::create_dir_all(write_dir)
            .with_context(|| format!("Failed to create directory: {}", write_dir.display()))?;
        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("Failed to create output directory: {}", self.output_dir.display())
        })?;

        let temp = TempFile::in_dir(write_dir, name, "tmp");
        tracing::info!(
            "Writing {} rows x {} columns to {}",
            df.height(),
            df.width(),
            temp.path().display()
        );

        let file = fs::File::create(temp.path()).context("Failed to create extract file")?;
        let mut frame = df.clone();
        ParquetWriter::new(file)
            .finish(&mut frame)
            .context("Failed to write extract file")?;

        let sha256 = compute_file_hash(temp.path())?;
        let manifest = ExtractManifest::describe(name, df, sha256);

        // Final renames happen within the output directory
        let landed = if use_staging_mount {
            let landed = TempFile::in_dir(&self.output_dir, name, "tmp");
            move_file(temp.path(), landed.path())?;
            landed
        } else {
            temp
        };
        let manifest_temp = TempFile::in_dir(&self.output_dir, name, "manifest.tmp");
        manifest.save(manifest_temp.path())?;

        let final_path = self.extract_path(name);
        let final_manifest = manifest_path(&final_path);
        fs::rename(landed.path(), &final_path).with_context(|| {
            format!("Failed to move extract into place: {}", final_path.display())
        })?;
        if let Err(e) = fs::rename(manifest_temp.path(), &final_manifest) {
            // Never leave data next to another write's manifest
            let _ = fs::remove_file(&final_path);
            return Err(e).with_context(|| {
                format!("Failed to move manifest into place: {}", final_manifest.display())
            });
        }

        tracing::info!(
            "Extract '{name}' materialized at {} (id {})",
            final_path.display(),
            manifest.extract_id
        );
        Ok(final_path)
    }
}

impl ExtractReader for ExtractStore {
    fn scan(&self, path: &Path, table: &TableRef, limit: usize) -> Result<DataFrame> {
        let manifest = Self::open(path)?;
        Self::check_table(&manifest, table)?;

        let limit = IdxSize::try_from(limit).unwrap_or(IdxSize::MAX);
        LazyFrame::scan_parquet(path, Default::default())
            .context("Failed to open extract file")?
            .limit(limit)
            .collect()
            .context("Failed to scan extract file")
    }

    fn table_definition(&self, path: &Path, table: &TableRef) -> Result<TableDefinition> {
        let manifest = Self::open(path)?;
        Self::check_table(&manifest, table)?;

        let schema = LazyFrame::scan_parquet(path, Default::default())
            .context("Failed to open extract file")?
            .collect_schema()
            .context("Failed to read extract schema")?;

        let file_columns: Vec<&str> = schema.iter_names().map(|n| n.as_str()).collect();
        let manifest_columns: Vec<&str> =
            manifest.columns.iter().map(|c| c.name.as_str()).collect();
        if file_columns != manifest_columns {
            anyhow::bail!(
                "Extract schema does not match its manifest: file has {file_columns:?}, manifest has {manifest_columns:?}"
            );
        }

        // The file is authoritative for types, the manifest for nullability
        let columns = manifest
            .columns
            .into_iter()
            .zip(schema.iter())
            .map(|(mut column, (_, dtype))| {
                column.data_type = dtype.to_string();
                column
            })
            .collect();

        Ok(TableDefinition {
            table: manifest.table,
            columns,
        })
    }
}

/// Extract names become file stems, so they cannot address other directories.
fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        anyhow::bail!("Extract name must not be empty");
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        anyhow::bail!("Extract name '{name}' must be a plain file name");
    }
    Ok(())
}

/// Moves a file, falling back to copy + delete across devices (e.g. from a mount).
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if let Err(e) = fs::rename(from, to) {
        tracing::warn!(
            "Rename {} -> {} failed ({e}), copying instead",
            from.display(),
            to.display()
        );
        fs::copy(from, to)
            .with_context(|| format!("Failed to move file (Rename error: {e})"))?;
        let _ = fs::remove_file(from);
    }
    Ok(())
}

/// Deletes the file on drop unless it has been moved away.
struct TempFile {
    path: PathBuf,
}

impl TempFile {
    fn in_dir(dir: &Path, name: &str, suffix: &str) -> Self {
        Self {
            path: dir.join(format!(".{name}.{}.{suffix}", Uuid::new_v4())),
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.path.exists() {
            let _ = fs::remove_file(&self.path);
        }
    }
}
