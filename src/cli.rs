use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use hyperleaup::config::{Settings, load_settings};
use hyperleaup::engine::{PolarsSqlEngine, load_lazy};
use hyperleaup::extract::{Collaborators, ExtractSource, HyperFile};
use hyperleaup::ports::{
    DEFAULT_DATASOURCE_NAME, DEFAULT_EXTRACT_SCHEMA, DEFAULT_EXTRACT_TABLE, DEFAULT_PROJECT_NAME,
    ExtractReader as _, PublishRequest, TableRef,
};
use hyperleaup::publisher::TableauPublisher;
use hyperleaup::store::ExtractStore;
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "hyperleaup",
    about = "Create and publish Tableau extracts from SQL or data files"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build an extract, optionally show it and publish it
    Create(CreateArgs),
    /// Preview and describe an existing extract file
    Inspect {
        /// Path to the extract file
        #[arg(short, long)]
        path: PathBuf,

        /// Number of rows to preview. Defaults to the configured preview limit.
        #[arg(short, long)]
        limit: Option<usize>,

        /// Schema of the table to read
        #[arg(long, default_value = DEFAULT_EXTRACT_SCHEMA)]
        schema: String,

        /// Table to read
        #[arg(long, default_value = DEFAULT_EXTRACT_TABLE)]
        table: String,

        /// Path to a JSON settings file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
pub struct CreateArgs {
    /// Extract name, also used as the file name
    #[arg(short, long)]
    name: String,

    /// SQL query producing the extract's rows
    #[arg(long, required_unless_present = "input", conflicts_with = "input")]
    sql: Option<String>,

    /// Data file (CSV, Parquet, JSON, NDJSON) to use as the extract's rows
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Register a file as a SQL table, e.g. `--table sales=data/sales.csv`
    #[arg(long = "table", value_name = "NAME=PATH", value_parser = parse_table_arg)]
    tables: Vec<(String, PathBuf)>,

    /// Write through the staging mount before moving to the output directory
    #[arg(long)]
    staging: bool,

    /// Directory for the final extract. Overrides the settings file.
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Path to a JSON settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the first rows of the extract (default: configured preview limit)
    #[arg(long, value_name = "ROWS", num_args = 0..=1)]
    preview: Option<Option<usize>>,

    /// Print the extract's table definition
    #[arg(long)]
    describe: bool,

    #[command(flatten)]
    publish: PublishArgs,
}

#[derive(Args)]
struct PublishArgs {
    /// Tableau Server or Cloud URL. Publishes the extract when set.
    #[arg(long, requires_all = ["username", "password"])]
    server: Option<String>,

    #[arg(long)]
    username: Option<String>,

    #[arg(long, env = "HYPERLEAUP_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Site content URL. Empty selects the default site.
    #[arg(long, default_value = "")]
    site_id: String,

    /// Target project
    #[arg(long, default_value = DEFAULT_PROJECT_NAME)]
    project: String,

    /// Name of the published data source
    #[arg(long, default_value = DEFAULT_DATASOURCE_NAME)]
    datasource: String,
}

impl PublishArgs {
    fn into_request(self) -> Option<PublishRequest> {
        let server = self.server?;
        let username = self.username.unwrap_or_default();
        let password = SecretString::new(self.password.unwrap_or_default().into());
        Some(
            PublishRequest::new(server, username, password)
                .site_id(self.site_id)
                .project_name(self.project)
                .datasource_name(self.datasource),
        )
    }
}

pub fn run_command(command: Commands) -> Result<()> {
    match command {
        Commands::Create(args) => handle_create(args),
        Commands::Inspect {
            path,
            limit,
            schema,
            table,
            config,
        } => handle_inspect(&path, limit, &TableRef::new(schema, table), config.as_deref()),
    }
}

fn handle_create(args: CreateArgs) -> Result<()> {
    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(dir) = args.output_dir {
        settings.output_dir = dir;
    }

    let mut engine = PolarsSqlEngine::new();
    for (name, path) in &args.tables {
        engine
            .register_file(name.as_str(), path)
            .with_context(|| format!("Failed to register table '{name}'"))?;
    }
    tracing::debug!("Registered tables: {:?}", engine.table_names());

    let dataset = match &args.input {
        Some(path) => Some(
            load_lazy(path)?
                .collect()
                .with_context(|| format!("Failed to load {}", path.display()))?,
        ),
        None => None,
    };
    let source = ExtractSource::from_parts(args.sql, dataset)?;

    let collaborators = collaborators(&settings, engine)?;
    let mut extract = HyperFile::create(args.name, source, args.staging, &collaborators)?;
    println!(
        "Created extract '{}' ({} rows) at {}",
        extract.name(),
        extract.data().height(),
        extract.path().display()
    );

    if let Some(limit) = args.preview {
        let rows = extract.preview(limit.unwrap_or(settings.preview_row_limit))?;
        println!("{rows}");
    }
    if args.describe {
        print!("{}", extract.describe_default_schema()?);
    }

    if let Some(request) = args.publish.into_request() {
        let luid = extract.publish(&request)?;
        println!(
            "Published '{}' to project '{}' as data source {luid}",
            request.datasource_name, request.project_name
        );
    }
    Ok(())
}

fn handle_inspect(
    path: &Path,
    limit: Option<usize>,
    table: &TableRef,
    config: Option<&Path>,
) -> Result<()> {
    let settings = load_settings(config)?;
    let store = ExtractStore::from_settings(&settings);

    let definition = store.table_definition(path, table)?;
    print!("{definition}");

    let rows = store.scan(path, table, limit.unwrap_or(settings.preview_row_limit))?;
    println!("{rows}");
    Ok(())
}

fn collaborators(settings: &Settings, engine: PolarsSqlEngine) -> Result<Collaborators> {
    let store = Arc::new(ExtractStore::from_settings(settings));
    Ok(Collaborators {
        query_engine: Arc::new(engine),
        materializer: store.clone(),
        reader: store,
        publisher: Arc::new(TableauPublisher::new(&settings.tableau)?),
    })
}

fn parse_table_arg(value: &str) -> Result<(String, PathBuf), String> {
    let (name, path) = value
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=PATH, got '{value}'"))?;
    if name.trim().is_empty() || path.trim().is_empty() {
        return Err(format!("expected NAME=PATH, got '{value}'"));
    }
    Ok((name.trim().to_owned(), PathBuf::from(path.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory as _;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_table_arg() {
        assert_eq!(
            parse_table_arg("sales=data/sales.csv").unwrap(),
            ("sales".to_owned(), PathBuf::from("data/sales.csv"))
        );
        assert!(parse_table_arg("sales").is_err());
        assert!(parse_table_arg("=data/sales.csv").is_err());
    }

    #[test]
    fn test_create_requires_exactly_one_source() {
        assert!(Cli::try_parse_from(["hyperleaup", "create", "--name", "x"]).is_err());
        assert!(
            Cli::try_parse_from([
                "hyperleaup", "create", "--name", "x", "--sql", "SELECT 1", "--input", "a.csv"
            ])
            .is_err()
        );
        assert!(
            Cli::try_parse_from(["hyperleaup", "create", "--name", "x", "--sql", "SELECT 1"])
                .is_ok()
        );
    }

    #[test]
    fn test_preview_value_is_optional() {
        let cli = Cli::try_parse_from([
            "hyperleaup", "create", "--name", "x", "--sql", "SELECT 1", "--preview",
        ])
        .unwrap();
        let Commands::Create(args) = cli.command else {
            panic!("expected create");
        };
        assert_eq!(args.preview, Some(None));

        let cli = Cli::try_parse_from([
            "hyperleaup", "create", "--name", "x", "--sql", "SELECT 1", "--preview", "5",
        ])
        .unwrap();
        let Commands::Create(args) = cli.command else {
            panic!("expected create");
        };
        assert_eq!(args.preview, Some(Some(5)));
    }

    #[test]
    fn test_publish_request_built_only_with_server() {
        let cli = Cli::try_parse_from([
            "hyperleaup", "create", "--name", "x", "--sql", "SELECT 1", "--server",
            "https://tableau.example.com", "--username", "me", "--password", "pw", "--project",
            "Finance",
        ])
        .unwrap();
        let Commands::Create(args) = cli.command else {
            panic!("expected create");
        };
        let request = args.publish.into_request().unwrap();
        assert_eq!(request.server_url, "https://tableau.example.com");
        assert_eq!(request.project_name, "Finance");
        assert_eq!(request.datasource_name, DEFAULT_DATASOURCE_NAME);
        assert_eq!(request.site_id, "");
    }
}
