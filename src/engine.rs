//! SQL query engine backed by Polars' `SQLContext`.
//!
//! Tables are registered by name up front, either from in-memory frames or
//! from files on disk, and every query runs in a fresh context built from
//! those registrations.

use crate::ports::QueryEngine;
use anyhow::{Context as _, Result};
use polars::prelude::*;
use polars::sql::SQLContext;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Default)]
pub struct PolarsSqlEngine {
    tables: BTreeMap<String, LazyFrame>,
}

impl PolarsSqlEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a table backed by a query plan.
    pub fn register(&mut self, name: impl Into<String>, lf: LazyFrame) {
        let name = name.into();
        tracing::debug!("Registering table '{name}'");
        self.tables.insert(name, lf);
    }

    pub fn register_frame(&mut self, name: impl Into<String>, df: DataFrame) {
        self.register(name, df.lazy());
    }

    /// Registers a CSV, Parquet, JSON or NDJSON file as a table.
    ///
    /// # Errors
    ///
    /// Returns error if the extension is unsupported or the file cannot be scanned
    pub fn register_file(&mut self, name: impl Into<String>, path: &Path) -> Result<()> {
        let lf = load_lazy(path)?;
        self.register(name, lf);
        Ok(())
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }
}

impl QueryEngine for PolarsSqlEngine {
    fn execute(&self, sql: &str) -> Result<DataFrame> {
        let mut ctx = SQLContext::new();
        for (name, lf) in &self.tables {
            ctx.register(name, lf.clone());
        }

        tracing::info!("Executing query against {} table(s)", self.tables.len());
        let lf = ctx.execute(sql).context("Failed to plan SQL query")?;
        lf.collect().context("Failed to execute SQL query")
    }
}

/// Scans a data file lazily based on its extension.
///
/// # Errors
///
/// Returns error if the extension is unsupported or the file cannot be read
pub fn load_lazy(path: &Path) -> Result<LazyFrame> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "csv" => LazyCsvReader::new(path)
            .with_infer_schema_length(Some(10000))
            .with_has_header(true)
            .finish()
            .with_context(|| format!("Failed to scan CSV: {}", path.display())),
        "parquet" => LazyFrame::scan_parquet(path, Default::default())
            .with_context(|| format!("Failed to scan Parquet: {}", path.display())),
        "json" => {
            // No lazy JSON scanner for array documents, read eagerly
            let file = std::fs::File::open(path)
                .with_context(|| format!("Failed to open JSON: {}", path.display()))?;
            let df = JsonReader::new(file)
                .finish()
                .with_context(|| format!("Failed to read JSON: {}", path.display()))?;
            Ok(df.lazy())
        }
        "ndjson" | "jsonl" => LazyJsonLineReader::new(path)
            .finish()
            .with_context(|| format!("Failed to scan NDJSON: {}", path.display())),
        _ => Err(anyhow::anyhow!("Unsupported file extension: {ext}")),
    }
}
