//! The extract handle: one dataset, normalized and frozen into a file.
//!
//! [`HyperFile::create`] runs the whole pipeline in one step:
//!
//! ```text
//! ExtractSource ──Sql──> QueryEngine ──┐
//!        └────Dataset──────────────────┴─> normalize ─> Materializer ─> path
//! ```
//!
//! Either every stage succeeds and a handle with a file on disk is returned,
//! or the error of the failed stage is. Afterwards the handle can read the
//! file back ([`HyperFile::preview`], [`HyperFile::describe_schema`]) and
//! publish it ([`HyperFile::publish`]).
//!
//! ```no_run
//! use hyperleaup::config::Settings;
//! use hyperleaup::engine::PolarsSqlEngine;
//! use hyperleaup::extract::{Collaborators, ExtractSource, HyperFile};
//! use hyperleaup::publisher::TableauPublisher;
//! use hyperleaup::store::ExtractStore;
//! use std::sync::Arc;
//!
//! # fn example() -> anyhow::Result<()> {
//! let settings = Settings::default();
//! let mut engine = PolarsSqlEngine::new();
//! engine.register_file("sales", "data/sales.csv".as_ref())?;
//!
//! let store = Arc::new(ExtractStore::from_settings(&settings));
//! let collaborators = Collaborators {
//!     query_engine: Arc::new(engine),
//!     materializer: store.clone(),
//!     reader: store,
//!     publisher: Arc::new(TableauPublisher::new(&settings.tableau)?),
//! };
//!
//! let extract = HyperFile::create(
//!     "sales",
//!     ExtractSource::Sql("SELECT * FROM sales".to_owned()),
//!     false,
//!     &collaborators,
//! )?;
//! println!("{}", extract.preview(10)?);
//! # Ok(())
//! # }
//! ```

use crate::cleaning;
use crate::config::DEFAULT_PREVIEW_ROW_LIMIT;
use crate::error::{HyperleaupError, Result};
use crate::ports::{
    ExtractReader, Materializer, PublishRequest, Publisher, QueryEngine, TableDefinition, TableRef,
};
use polars::prelude::DataFrame;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where the extract's data comes from.
#[derive(Clone)]
pub enum ExtractSource {
    /// SQL text resolved through the query engine
    Sql(String),
    /// A dataset supplied directly
    Dataset(DataFrame),
}

impl ExtractSource {
    /// Builds a source from two optional arguments, exactly one of which must be set.
    ///
    /// # Errors
    ///
    /// Returns [`HyperleaupError::Configuration`] when both or neither are given
    pub fn from_parts(sql: Option<String>, dataset: Option<DataFrame>) -> Result<Self> {
        match (sql, dataset) {
            (Some(sql), None) => Ok(Self::Sql(sql)),
            (None, Some(df)) => Ok(Self::Dataset(df)),
            (Some(_), Some(_)) => Err(HyperleaupError::Configuration(
                "Extract must have either SQL or a dataset as its source, not both".to_owned(),
            )),
            (None, None) => Err(HyperleaupError::Configuration(
                "Extract must have SQL or a dataset as its source".to_owned(),
            )),
        }
    }
}

impl fmt::Debug for ExtractSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sql(sql) => f.debug_tuple("Sql").field(sql).finish(),
            Self::Dataset(df) => write!(f, "Dataset({} x {})", df.height(), df.width()),
        }
    }
}

/// The systems an extract depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub query_engine: Arc<dyn QueryEngine>,
    pub materializer: Arc<dyn Materializer>,
    pub reader: Arc<dyn ExtractReader>,
    pub publisher: Arc<dyn Publisher>,
}

/// A materialized extract and its publish state.
pub struct HyperFile {
    name: String,
    is_staging_enabled: bool,
    df: DataFrame,
    path: PathBuf,
    luid: Option<String>,
    reader: Arc<dyn ExtractReader>,
    publisher: Arc<dyn Publisher>,
}

impl HyperFile {
    /// Resolves, normalizes and materializes `source` as the extract `name`.
    ///
    /// # Errors
    ///
    /// - [`HyperleaupError::Configuration`] for an empty name
    /// - [`HyperleaupError::Query`] if the SQL source fails
    /// - [`HyperleaupError::Materialization`] if normalizing or writing fails
    pub fn create(
        name: impl Into<String>,
        source: ExtractSource,
        use_staging_mount: bool,
        collaborators: &Collaborators,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(HyperleaupError::Configuration(
                "Extract name must not be empty".to_owned(),
            ));
        }

        tracing::info!("Creating extract '{name}' from {source:?}");
        let raw = match source {
            ExtractSource::Sql(sql) => collaborators
                .query_engine
                .execute(&sql)
                .map_err(HyperleaupError::Query)?,
            ExtractSource::Dataset(df) => df,
        };

        let df = cleaning::normalize(&raw).map_err(HyperleaupError::Materialization)?;
        let path = collaborators
            .materializer
            .materialize(&df, &name, use_staging_mount)
            .map_err(HyperleaupError::Materialization)?;

        tracing::info!("Extract '{name}' ready at {}", path.display());
        Ok(Self {
            name,
            is_staging_enabled: use_staging_mount,
            df,
            path,
            luid: None,
            reader: Arc::clone(&collaborators.reader),
            publisher: Arc::clone(&collaborators.publisher),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The normalized dataset that was written to the file.
    pub fn data(&self) -> &DataFrame {
        &self.df
    }

    pub fn is_staging_enabled(&self) -> bool {
        self.is_staging_enabled
    }

    /// Server-assigned data source id, set by the last successful publish.
    pub fn luid(&self) -> Option<&str> {
        self.luid.as_deref()
    }

    /// First `limit` rows of the default table, in file order.
    ///
    /// # Errors
    ///
    /// Returns [`HyperleaupError::FileAccess`] if the file is missing or unreadable
    pub fn preview(&self, limit: usize) -> Result<DataFrame> {
        self.ensure_file_exists()?;
        self.reader
            .scan(&self.path, &TableRef::default(), limit)
            .map_err(HyperleaupError::FileAccess)
    }

    /// [`Self::preview`] with the default limit of 1,000 rows.
    ///
    /// # Errors
    ///
    /// Returns [`HyperleaupError::FileAccess`] if the file is missing or unreadable
    pub fn preview_default(&self) -> Result<DataFrame> {
        self.preview(DEFAULT_PREVIEW_ROW_LIMIT)
    }

    /// Column names, types and nullability of `table`, in file order.
    ///
    /// # Errors
    ///
    /// Returns [`HyperleaupError::FileAccess`] if the file is missing, unreadable
    /// or has no such table
    pub fn describe_schema(&self, table: &TableRef) -> Result<TableDefinition> {
        self.ensure_file_exists()?;
        self.reader
            .table_definition(&self.path, table)
            .map_err(HyperleaupError::FileAccess)
    }

    /// [`Self::describe_schema`] for `"Extract"."Extract"`.
    ///
    /// # Errors
    ///
    /// Returns [`HyperleaupError::FileAccess`] if the file is missing or unreadable
    pub fn describe_default_schema(&self) -> Result<TableDefinition> {
        self.describe_schema(&TableRef::default())
    }

    /// Uploads the extract and records the identity the server assigns.
    ///
    /// Publishing again replaces the stored identity. On failure the
    /// previous identity, if any, is kept.
    ///
    /// # Errors
    ///
    /// Returns [`HyperleaupError::Publish`] if authentication or upload fails
    pub fn publish(&mut self, request: &PublishRequest) -> Result<&str> {
        tracing::info!(
            "Publishing extract '{}' to {} as '{}' in project '{}'",
            self.name,
            request.server_url,
            request.datasource_name,
            request.project_name
        );
        let luid = self
            .publisher
            .publish(request, &self.path)
            .map_err(HyperleaupError::Publish)?;

        tracing::info!("Extract published with data source LUID: {luid}");
        Ok(self.luid.insert(luid).as_str())
    }

    fn ensure_file_exists(&self) -> Result<()> {
        if self.path.is_file() {
            Ok(())
        } else {
            Err(HyperleaupError::FileAccess(anyhow::anyhow!(
                "Extract file not found: {}",
                self.path.display()
            )))
        }
    }
}

impl fmt::Debug for HyperFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperFile")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("is_staging_enabled", &self.is_staging_enabled)
            .field("rows", &self.df.height())
            .field("luid", &self.luid)
            .finish_non_exhaustive()
    }
}
