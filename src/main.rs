//! scanstore CLI
//!
//! Command-line interface for ingesting scan reports and browsing them:
//! - Ingest a report file into the local store
//! - List tests, happy paths and operations page by page
//! - Look up single records and dictionary listings
//! - Generate a default config file

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use scanstore::config::{generate_default_config, Config, LoggingConfig};
use scanstore::index::DictEntry;
use scanstore::ingest::ReportIngestor;
use scanstore::query::{Filter, ListOptions, Page, ReportQuery, SortSpec};
use scanstore::storage::{SortOrder, SqliteStore};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

#[derive(Parser)]
#[command(name = "scanstore")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Streaming ingestion and paginated queries for API scan reports")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: standard locations + SCANSTORE_* variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overrides the config
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Output format (table, json, csv)
    #[arg(short, long, default_value = "table", global = true)]
    format: String,
}

#[derive(Args)]
struct ListArgs {
    /// Page number (1-based)
    #[arg(short, long, default_value = "1")]
    page: u64,

    /// Records per page (default: from config)
    #[arg(short, long)]
    size: Option<u64>,

    /// Field to sort by (criticality, path, method, operationId, testKey)
    #[arg(long)]
    sort: Option<String>,

    /// Sort order (asc, desc)
    #[arg(long, default_value = "asc")]
    order: String,

    /// Filter as field<op>value, e.g. criticality>=4 (repeatable, AND-combined)
    #[arg(short = 'F', long)]
    filter: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a scan report JSON file
    Ingest {
        /// Path to the report
        path: PathBuf,
        /// Bytes per chunk (default: from config)
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// List conformance tests
    Tests(ListArgs),

    /// Show one conformance test
    Test {
        /// Test id
        id: u64,
    },

    /// List happy path scenarios
    HappyPaths(ListArgs),

    /// Show one happy path scenario
    HappyPath {
        /// Happy path id
        id: u64,
    },

    /// List operations
    Operations(ListArgs),

    /// List paths
    Paths,

    /// List HTTP methods
    Methods,

    /// List operation ids
    OperationIds,

    /// Show scan version, summary and counts
    Summary,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print the effective configuration instead
        #[arg(long)]
        effective: bool,
    },
}

fn fmt_layer<W>(format: &str, writer: W, ansi: bool) -> Box<dyn Layer<Registry> + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    if format == "json" {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .with_ansi(ansi)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .boxed()
    }
}

fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    let layer = match &config.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path))?;
            fmt_layer(&config.format, Mutex::new(file), false)
        }
        // Keep stdout clean for json/csv output
        None => fmt_layer(&config.format, std::io::stderr, true),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("scanstore={}", config.level).into()),
        )
        .init();
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Ok(Config::load_with_env(path)?),
        None => Ok(Config::load_default()),
    }
}

fn open_store(config: &Config, db: Option<&PathBuf>) -> anyhow::Result<Arc<SqliteStore>> {
    let path = db
        .cloned()
        .unwrap_or_else(|| PathBuf::from(&config.storage.db_path));
    let store = SqliteStore::open(&path, config.storage.compression)
        .with_context(|| format!("opening store {:?}", path))?;
    Ok(Arc::new(store))
}

fn list_options(args: &ListArgs) -> anyhow::Result<ListOptions> {
    let mut options = ListOptions::default();
    if let Some(field) = &args.sort {
        let order: SortOrder = args.order.parse().map_err(anyhow::Error::msg)?;
        options = options.sorted(SortSpec::new(field.clone(), order));
    }
    for expr in &args.filter {
        options = options.filter(Filter::parse(expr)?);
    }
    Ok(options)
}

fn page_args(args: &ListArgs, config: &Config) -> anyhow::Result<(u64, u64)> {
    if args.page == 0 {
        bail!("pages are numbered from 1");
    }
    Ok((args.page - 1, args.size.unwrap_or(config.query.page_size)))
}

/// Flat output row for table and csv formats
trait Tabular {
    fn headers() -> &'static [&'static str];
    fn cells(&self) -> Vec<String>;
}

impl Tabular for scanstore::query::TestView {
    fn headers() -> &'static [&'static str] {
        &["id", "criticality", "method", "path", "operationId", "testKey"]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.criticality.to_string(),
            self.method.to_uppercase(),
            self.path.clone(),
            self.operation_id.clone(),
            self.test_key.clone().unwrap_or_default(),
        ]
    }
}

impl Tabular for scanstore::query::HappyPathView {
    fn headers() -> &'static [&'static str] {
        &["id", "method", "path", "operationId"]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.method.to_uppercase(),
            self.path.clone(),
            self.operation_id.clone(),
        ]
    }
}

impl Tabular for scanstore::query::OperationView {
    fn headers() -> &'static [&'static str] {
        &["id", "method", "path", "operationId"]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.method.to_uppercase(),
            self.path.clone(),
            self.operation_id.clone(),
        ]
    }
}

impl Tabular for DictEntry {
    fn headers() -> &'static [&'static str] {
        &["id", "value"]
    }

    fn cells(&self) -> Vec<String> {
        vec![self.id.to_string(), self.value.clone()]
    }
}

fn print_rows<T: Tabular + Serialize>(format: &str, rows: &[T]) -> anyhow::Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(rows)?),
        "csv" => {
            let mut writer = csv::Writer::from_writer(std::io::stdout());
            writer.write_record(T::headers())?;
            for row in rows {
                writer.write_record(row.cells())?;
            }
            writer.flush()?;
        }
        _ => print_table(rows)?,
    }
    Ok(())
}

fn print_table<T: Tabular>(rows: &[T]) -> anyhow::Result<()> {
    let headers = T::headers();
    let cells: Vec<Vec<String>> = rows.iter().map(Tabular::cells).collect();

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            cells
                .iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(h.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = std::io::stdout().lock();
    let line = |row: Vec<&str>| -> String {
        row.iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{:<width$}", cell, width = w))
            .collect::<Vec<_>>()
            .join("  ")
    };

    writeln!(out, "{}", line(headers.to_vec()))?;
    writeln!(out, "{}", "-".repeat(widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1)))?;
    for row in &cells {
        writeln!(out, "{}", line(row.iter().map(String::as_str).collect()))?;
    }
    Ok(())
}

fn print_page<T: Tabular + Serialize>(format: &str, page: &Page<T>) -> anyhow::Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(page)?);
        return Ok(());
    }

    print_rows(format, &page.items)?;
    if format != "csv" {
        println!();
        println!(
            "Page {} of {} ({} total)",
            page.current + 1,
            page.pages.max(1),
            page.total
        );
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_ref())?;

    if let Commands::Config { output, effective } = &cli.command {
        let content = if *effective {
            toml::to_string_pretty(&config)?
        } else {
            generate_default_config()
        };
        match output {
            Some(path) => {
                std::fs::write(path, content)?;
                println!("Config written to {:?}", path);
            }
            None => print!("{}", content),
        }
        return Ok(());
    }

    init_tracing(&config.logging)?;
    let store = open_store(&config, cli.db.as_ref())?;

    match cli.command {
        Commands::Ingest { path, chunk_size } => {
            if let Some(size) = chunk_size {
                config.ingest.chunk_size = size;
            }

            tracing::info!("scanstore v{}", env!("CARGO_PKG_VERSION"));
            let mut ingestor = ReportIngestor::start(store, config.ingest.options()).await?;
            ingestor.ingest_file(&path).await?;
            let stats = ingestor.finish().await?;

            if cli.format == "json" {
                print_json(&stats)?;
            } else {
                println!("Ingested {:?}", path);
                println!("  Operations:  {}", stats.operations);
                println!("  Tests:       {}", stats.tests);
                println!("  Happy paths: {}", stats.happy_paths);
                println!("  Chunks:      {} ({} bytes)", stats.chunks, stats.bytes);
                println!("  Time:        {}ms", stats.elapsed_ms);
            }
        }

        Commands::Tests(args) => {
            let (page, size) = page_args(&args, &config)?;
            let page = ReportQuery::new(store)
                .get_tests(page, size, &list_options(&args)?)
                .await?;
            print_page(&cli.format, &page)?;
        }

        Commands::Test { id } => {
            let test = ReportQuery::new(store).get_test(id).await?;
            print_json(&test)?;
        }

        Commands::HappyPaths(args) => {
            let (page, size) = page_args(&args, &config)?;
            let page = ReportQuery::new(store)
                .get_happy_paths(page, size, &list_options(&args)?)
                .await?;
            print_page(&cli.format, &page)?;
        }

        Commands::HappyPath { id } => {
            let happy_path = ReportQuery::new(store).get_happy_path(id).await?;
            print_json(&happy_path)?;
        }

        Commands::Operations(args) => {
            let (page, size) = page_args(&args, &config)?;
            let page = ReportQuery::new(store)
                .get_operations(page, size, &list_options(&args)?)
                .await?;
            print_page(&cli.format, &page)?;
        }

        Commands::Paths => {
            let paths = ReportQuery::new(store).get_paths().await?;
            print_rows(&cli.format, &paths)?;
        }

        Commands::Methods => {
            let methods = ReportQuery::new(store).get_methods().await?;
            print_rows(&cli.format, &methods)?;
        }

        Commands::OperationIds => {
            let ids = ReportQuery::new(store).get_operation_ids().await?;
            print_rows(&cli.format, &ids)?;
        }

        Commands::Summary => {
            let meta = ReportQuery::new(store).get_report_meta().await?;
            if cli.format == "json" {
                print_json(&meta)?;
            } else {
                let version = meta
                    .scan_version
                    .as_ref()
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown");
                println!("scanstore v{}", env!("CARGO_PKG_VERSION"));
                println!();
                println!("Report:");
                println!("  Scan version: {}", version);
                println!("  Run id:       {}", meta.run_id);
                println!("  Ingested at:  {}", meta.ingested_at.format("%Y-%m-%dT%H:%M:%SZ"));
                println!();
                println!("Records:");
                println!("  Operations:  {}", meta.counts.operations);
                println!("  Tests:       {}", meta.counts.tests);
                println!("  Happy paths: {}", meta.counts.happy_paths);
                if let Some(summary) = &meta.summary {
                    println!();
                    println!("Summary:");
                    println!("{}", serde_json::to_string_pretty(summary)?);
                }
            }
        }

        // Handled before the store is opened
        Commands::Config { .. } => {}
    }

    Ok(())
}
