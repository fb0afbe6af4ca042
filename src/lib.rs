//! # hyperleaup
//!
//! Builds Tableau extracts from SQL queries or in-memory datasets and
//! publishes them to Tableau Server or Tableau Cloud.
//!
//! ## Quick Start
//!
//! ```no_run
//! use hyperleaup::config::load_settings;
//! use hyperleaup::engine::PolarsSqlEngine;
//! use hyperleaup::extract::{Collaborators, ExtractSource, HyperFile};
//! use hyperleaup::ports::PublishRequest;
//! use hyperleaup::publisher::TableauPublisher;
//! use hyperleaup::store::ExtractStore;
//! use secrecy::SecretString;
//! use std::sync::Arc;
//!
//! # fn example() -> anyhow::Result<()> {
//! let settings = load_settings(None)?;
//! let mut engine = PolarsSqlEngine::new();
//! engine.register_file("trips", "trips.parquet".as_ref())?;
//!
//! let store = Arc::new(ExtractStore::from_settings(&settings));
//! let collaborators = Collaborators {
//!     query_engine: Arc::new(engine),
//!     materializer: store.clone(),
//!     reader: store,
//!     publisher: Arc::new(TableauPublisher::new(&settings.tableau)?),
//! };
//!
//! let mut extract = HyperFile::create(
//!     "trips",
//!     ExtractSource::Sql("SELECT * FROM trips WHERE fare > 0".to_owned()),
//!     false,
//!     &collaborators,
//! )?;
//! println!("{}", extract.describe_default_schema()?);
//!
//! let request = PublishRequest::new(
//!     "https://tableau.example.com",
//!     "analyst",
//!     SecretString::new("password".into()),
//! )
//! .project_name("Finance");
//! let luid = extract.publish(&request)?;
//! println!("Published as {luid}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`extract`]: the extract handle and its create/preview/describe/publish operations
//! - [`cleaning`]: column classification and null normalization
//! - [`ports`]: traits for the external systems plus the shared value types
//! - [`engine`]: SQL over registered tables (Polars)
//! - [`store`]: extract files and their manifests
//! - [`publisher`]: Tableau REST API client
//! - [`config`], [`logging`], [`error`]: settings, log setup and the error taxonomy

#![warn(clippy::all, rust_2018_idioms)]

pub mod cleaning;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod logging;
pub mod ports;
pub mod publisher;
pub mod store;
