//! Capability interfaces for the systems an extract talks to.
//!
//! [`crate::extract::HyperFile`] never reaches a query engine, the file
//! store or a server directly; it is handed implementations of these traits.
//! Production adapters live in [`crate::engine`], [`crate::store`] and
//! [`crate::publisher`]. Tests substitute in-memory fakes.
//!
//! Adapters report failures as [`anyhow::Error`]; the caller decides which
//! pipeline stage the failure belongs to.

use anyhow::Result;
use polars::prelude::{DataFrame, DataType};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Schema and table holding the data inside an extract file.
pub const DEFAULT_EXTRACT_SCHEMA: &str = "Extract";
pub const DEFAULT_EXTRACT_TABLE: &str = "Extract";

pub const DEFAULT_PROJECT_NAME: &str = "Default";
pub const DEFAULT_DATASOURCE_NAME: &str = "Hyperleaup_Extract";

/// Resolves SQL text into a dataset.
pub trait QueryEngine: Send + Sync {
    fn execute(&self, sql: &str) -> Result<DataFrame>;
}

/// Freezes a dataset into an extract file.
pub trait Materializer: Send + Sync {
    /// Writes `df` as the extract called `name` and returns the final file path.
    /// With `use_staging_mount` the file is first written to the staging mount.
    fn materialize(&self, df: &DataFrame, name: &str, use_staging_mount: bool) -> Result<PathBuf>;
}

/// Read-only access to a materialized extract.
///
/// Each call opens the file, performs one read and releases it before
/// returning.
pub trait ExtractReader: Send + Sync {
    /// Up to `limit` rows of `table`, in file order.
    fn scan(&self, path: &Path, table: &TableRef, limit: usize) -> Result<DataFrame>;

    fn table_definition(&self, path: &Path, table: &TableRef) -> Result<TableDefinition>;
}

/// Uploads an extract file and returns the identity the server assigned to it.
pub trait Publisher: Send + Sync {
    fn publish(&self, request: &PublishRequest, file_path: &Path) -> Result<String>;
}

/// Fully qualified table name inside an extract.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }
}

impl Default for TableRef {
    fn default() -> Self {
        Self::new(DEFAULT_EXTRACT_SCHEMA, DEFAULT_EXTRACT_TABLE)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let quote = |s: &str| format!("\"{}\"", s.replace('"', "\"\""));
        write!(f, "{}.{}", quote(&self.schema), quote(&self.table))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    /// Declared type as the file reports it (e.g. `i32`, `str`)
    pub data_type: String,
    pub nullable: bool,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, dtype: &DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: dtype.to_string(),
            nullable,
        }
    }
}

/// Columns of one table, in file order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub table: TableRef,
    pub columns: Vec<ColumnDefinition>,
}

impl fmt::Display for TableDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "root")?;
        for column in &self.columns {
            let nullability = if column.nullable {
                "NULLABLE"
            } else {
                "NOT_NULLABLE"
            };
            writeln!(
                f,
                "|-- {}: {} (nullable = {nullability})",
                column.name, column.data_type
            )?;
        }
        Ok(())
    }
}

/// Where and as whom to publish an extract.
#[derive(Debug)]
pub struct PublishRequest {
    pub server_url: String,
    pub username: String,
    pub password: SecretString,
    /// Site content URL; empty selects the default site
    pub site_id: String,
    pub project_name: String,
    pub datasource_name: String,
}

impl PublishRequest {
    pub fn new(
        server_url: impl Into<String>,
        username: impl Into<String>,
        password: SecretString,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            username: username.into(),
            password,
            site_id: String::new(),
            project_name: DEFAULT_PROJECT_NAME.to_owned(),
            datasource_name: DEFAULT_DATASOURCE_NAME.to_owned(),
        }
    }

    pub fn site_id(mut self, site_id: impl Into<String>) -> Self {
        self.site_id = site_id.into();
        self
    }

    pub fn project_name(mut self, project_name: impl Into<String>) -> Self {
        self.project_name = project_name.into();
        self
    }

    pub fn datasource_name(mut self, datasource_name: impl Into<String>) -> Self {
        self.datasource_name = datasource_name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_ref() {
        let table = TableRef::default();
        assert_eq!(table.schema, "Extract");
        assert_eq!(table.table, "Extract");
        assert_eq!(table.to_string(), "\"Extract\".\"Extract\"");
    }

    #[test]
    fn test_table_ref_escapes_quotes() {
        let table = TableRef::new("my\"schema", "t");
        assert_eq!(table.to_string(), "\"my\"\"schema\".\"t\"");
    }

    #[test]
    fn test_table_definition_display() {
        let definition = TableDefinition {
            table: TableRef::default(),
            columns: vec![
                ColumnDefinition::new("age", &DataType::Int32, false),
                ColumnDefinition::new("city", &DataType::String, true),
            ],
        };

        assert_eq!(
            definition.to_string(),
            "root\n|-- age: i32 (nullable = NOT_NULLABLE)\n|-- city: str (nullable = NULLABLE)\n"
        );
    }

    #[test]
    fn test_publish_request_defaults() {
        let request = PublishRequest::new(
            "https://tableau.example.com",
            "analyst",
            SecretString::new("secret".into()),
        );
        assert_eq!(request.site_id, "");
        assert_eq!(request.project_name, "Default");
        assert_eq!(request.datasource_name, "Hyperleaup_Extract");

        let request = request.site_id("finance").project_name("Sales");
        assert_eq!(request.site_id, "finance");
        assert_eq!(request.project_name, "Sales");
    }
}
