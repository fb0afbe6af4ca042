//! End-to-end extract workflow: SQL over a CSV fixture, normalization,
//! materialization to disk, read-back and publishing to a stand-in server.

use hyperleaup::config::TableauSettings;
use hyperleaup::engine::{PolarsSqlEngine, load_lazy};
use hyperleaup::error::HyperleaupError;
use hyperleaup::extract::{Collaborators, ExtractSource, HyperFile};
use hyperleaup::ports::{PublishRequest, Publisher, TableRef};
use hyperleaup::publisher::TableauPublisher;
use hyperleaup::store::ExtractStore;
use polars::prelude::*;
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

const PEOPLE_CSV: &str = "testdata/people.csv";

/// Accepts every upload and hands out sequential ids.
#[derive(Default)]
struct CountingPublisher {
    uploads: AtomicUsize,
}

impl Publisher for CountingPublisher {
    fn publish(&self, _request: &PublishRequest, file_path: &Path) -> anyhow::Result<String> {
        anyhow::ensure!(file_path.is_file(), "nothing to upload");
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("ds-{n}"))
    }
}

fn setup(temp: &TempDir) -> (Collaborators, Arc<CountingPublisher>) {
    let mut engine = PolarsSqlEngine::new();
    engine
        .register_file("people", Path::new(PEOPLE_CSV))
        .unwrap();

    let store = Arc::new(ExtractStore::new(
        temp.path().join("extracts"),
        temp.path().join("staging"),
    ));
    let publisher = Arc::new(CountingPublisher::default());
    let collaborators = Collaborators {
        query_engine: Arc::new(engine),
        materializer: store.clone(),
        reader: store,
        publisher: publisher.clone(),
    };
    (collaborators, publisher)
}

fn i64_values(df: &DataFrame, name: &str) -> Vec<Option<i64>> {
    df.column(name)
        .unwrap()
        .as_materialized_series()
        .i64()
        .unwrap()
        .into_iter()
        .collect()
}

fn str_values(df: &DataFrame, name: &str) -> Vec<Option<String>> {
    df.column(name)
        .unwrap()
        .as_materialized_series()
        .str()
        .unwrap()
        .into_iter()
        .map(|v| v.map(str::to_owned))
        .collect()
}

#[test]
fn test_sql_extract_round_trip() {
    let temp = TempDir::new().unwrap();
    let (collaborators, _) = setup(&temp);

    let extract = HyperFile::create(
        "people",
        ExtractSource::Sql("SELECT id, age, city FROM people ORDER BY id".to_owned()),
        false,
        &collaborators,
    )
    .unwrap();

    assert_eq!(
        extract.path(),
        temp.path().join("extracts").join("people.parquet")
    );

    let rows = extract.preview_default().unwrap();
    assert_eq!(rows.height(), 5);
    assert_eq!(i64_values(&rows, "id"), vec![Some(1), Some(2), Some(3), Some(4), Some(5)]);
    assert_eq!(
        i64_values(&rows, "age"),
        vec![Some(36), Some(0), Some(28), Some(41), Some(0)]
    );
    let cities: Vec<Option<String>> = str_values(&rows, "city");
    assert_eq!(cities[2].as_deref(), Some(""));
    assert_eq!(cities[4].as_deref(), Some(""));
    assert_eq!(cities[1].as_deref(), Some("New York"));

    let head = extract.preview(2).unwrap();
    assert_eq!(i64_values(&head, "id"), vec![Some(1), Some(2)]);
}

#[test]
fn test_describe_reports_normalized_schema() {
    let temp = TempDir::new().unwrap();
    let (collaborators, _) = setup(&temp);

    let extract = HyperFile::create(
        "people",
        ExtractSource::Sql("SELECT id, age, city FROM people".to_owned()),
        false,
        &collaborators,
    )
    .unwrap();

    let definition = extract.describe_default_schema().unwrap();
    let names: Vec<&str> = definition.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "age", "city"]);
    assert!(definition.columns.iter().all(|c| !c.nullable));

    let rendered = definition.to_string();
    assert!(rendered.starts_with("root\n"));
    assert!(rendered.contains("|-- city: str (nullable = NOT_NULLABLE)"));

    assert!(matches!(
        extract.describe_schema(&TableRef::new("public", "people")),
        Err(HyperleaupError::FileAccess(_))
    ));
}

#[test]
fn test_dataset_extract_through_staging() {
    let temp = TempDir::new().unwrap();
    let (collaborators, _) = setup(&temp);
    let df = load_lazy(Path::new(PEOPLE_CSV)).unwrap().collect().unwrap();

    let extract = HyperFile::create(
        "people_raw",
        ExtractSource::Dataset(df),
        true,
        &collaborators,
    )
    .unwrap();

    assert!(extract.is_staging_enabled());
    assert!(extract.path().starts_with(temp.path().join("extracts")));
    assert_eq!(extract.data().height(), 5);
    for column in extract.data().get_columns() {
        assert_eq!(column.null_count(), 0, "column {} still has nulls", column.name());
    }
}

#[test]
fn test_unknown_table_is_query_error() {
    let temp = TempDir::new().unwrap();
    let (collaborators, _) = setup(&temp);

    let err = HyperFile::create(
        "missing",
        ExtractSource::Sql("SELECT * FROM nowhere".to_owned()),
        false,
        &collaborators,
    )
    .unwrap_err();

    assert!(matches!(err, HyperleaupError::Query(_)));
    assert_eq!(err.stage(), "query");
    let extract_path: PathBuf = temp.path().join("extracts").join("missing.parquet");
    assert!(!extract_path.exists());
}

#[test]
fn test_publish_records_latest_identity() {
    let temp = TempDir::new().unwrap();
    let (collaborators, publisher) = setup(&temp);
    let mut extract = HyperFile::create(
        "people",
        ExtractSource::Sql("SELECT * FROM people".to_owned()),
        false,
        &collaborators,
    )
    .unwrap();

    let request = PublishRequest::new(
        "https://tableau.example.com",
        "analyst",
        SecretString::new("pw".into()),
    )
    .project_name("People");

    assert_eq!(extract.publish(&request).unwrap(), "ds-1");
    assert_eq!(extract.publish(&request).unwrap(), "ds-2");
    assert_eq!(extract.luid(), Some("ds-2"));
    assert_eq!(publisher.uploads.load(Ordering::SeqCst), 2);
}

#[test]
fn test_preview_after_file_removed() {
    let temp = TempDir::new().unwrap();
    let (collaborators, _) = setup(&temp);
    let extract = HyperFile::create(
        "people",
        ExtractSource::Sql("SELECT * FROM people".to_owned()),
        false,
        &collaborators,
    )
    .unwrap();

    std::fs::remove_file(extract.path()).unwrap();

    let err = extract.preview(10).unwrap_err();
    assert!(matches!(err, HyperleaupError::FileAccess(_)));
    assert!(err.to_string().contains("not found"));
}

#[test]
fn test_parquet_extract_is_refused_by_tableau_publisher() {
    let temp = TempDir::new().unwrap();
    let (mut collaborators, _) = setup(&temp);
    let tableau = TableauPublisher::new(&TableauSettings::default()).unwrap();
    collaborators.publisher = Arc::new(tableau);
    let mut extract = HyperFile::create(
        "people",
        ExtractSource::Sql("SELECT * FROM people".to_owned()),
        false,
        &collaborators,
    )
    .unwrap();

    let request = PublishRequest::new(
        "http://127.0.0.1:9",
        "analyst",
        SecretString::new("pw".into()),
    );
    let err = extract.publish(&request).unwrap_err();

    assert!(matches!(err, HyperleaupError::Publish(_)));
    assert!(err.to_string().contains("got .parquet"));
    assert!(extract.luid().is_none());
}
