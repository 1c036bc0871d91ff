//! trialgraph CLI: run the transform-and-load pipeline from the command line
//!
//! Logs go to stderr (filtered by `RUST_LOG`) so `dry-run` output on stdout
//! stays valid JSON.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use comfy_table::{ContentArrangement, Table};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use trialgraph::loader::{cypher, trial_graph_schema};
use trialgraph::{
    DescriptionCoverage, EmbeddedBackend, GraphSummary, InferenceEngine, JsonFileSource, MalformedPolicy, Pipeline, PipelineConfig,
    RecordCleaner, RunSummary,
};

#[derive(Parser)]
#[command(name = "trialgraph", version, about = "Clinical trial transform-and-load engine")]
struct Cli {
    /// Pipeline config file (YAML)
    #[arg(long, global = true, env = "TRIALGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean study records and load them into the graph
    Load {
        /// JSON array or JSON-lines file of raw studies
        input: PathBuf,

        #[command(flatten)]
        overrides: Overrides,
    },
    /// Clean study records and print the canonical records as JSON
    DryRun {
        input: PathBuf,

        #[command(flatten)]
        overrides: Overrides,
    },
    /// Infer route and dosage form for a piece of text
    Infer {
        text: String,

        /// Rule table file (YAML)
        #[arg(long, env = "TRIALGRAPH_RULES")]
        rules: Option<PathBuf>,
    },
    /// Print the schema statements as Cypher
    Schema,
    /// Show node/edge counts and inference coverage of a stored graph
    Stats {
        /// Graph data directory
        #[arg(long, env = "TRIALGRAPH_DATA_DIR")]
        data_dir: PathBuf,
    },
}

/// Flags and environment variables that override the config file
#[derive(Args)]
struct Overrides {
    #[arg(long, env = "TRIALGRAPH_BATCH_SIZE")]
    batch_size: Option<usize>,

    #[arg(long, env = "TRIALGRAPH_LIMIT")]
    limit: Option<usize>,

    /// skip | abort
    #[arg(long, env = "TRIALGRAPH_ON_MALFORMED")]
    on_malformed: Option<MalformedPolicy>,

    #[arg(long, env = "TRIALGRAPH_RULES")]
    rules: Option<PathBuf>,

    /// Persist the graph here; in-memory when absent
    #[arg(long, env = "TRIALGRAPH_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Clean records on a single thread
    #[arg(long)]
    no_parallel: bool,
}

impl Overrides {
    fn apply(self, mut config: PipelineConfig) -> Result<PipelineConfig> {
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if self.limit.is_some() {
            config.limit = self.limit;
        }
        if let Some(policy) = self.on_malformed {
            config.on_malformed = policy;
        }
        if self.rules.is_some() {
            config.rules_path = self.rules;
        }
        if self.data_dir.is_some() {
            config.data_dir = self.data_dir;
        }
        if self.no_parallel {
            config.parallel_clean = false;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let base = match &cli.config {
        Some(path) => PipelineConfig::from_path(path)?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Commands::Load { input, overrides } => run_load(overrides.apply(base)?, input, cli.format).await,
        Commands::DryRun { input, overrides } => run_dry_run(overrides.apply(base)?, input),
        Commands::Infer { text, rules } => {
            let mut config = base;
            if rules.is_some() {
                config.rules_path = rules;
            }
            run_infer(&config, &text, cli.format)
        }
        Commands::Schema => {
            for statement in trial_graph_schema() {
                println!("{};", cypher::schema_statement(&statement));
            }
            Ok(())
        }
        Commands::Stats { data_dir } => run_stats(data_dir, cli.format).await,
    }
}

fn build_cleaner(config: &PipelineConfig) -> Result<RecordCleaner> {
    let rules = config.load_rules().context("loading rule table")?;
    Ok(RecordCleaner::new(InferenceEngine::new(Arc::new(rules))))
}

async fn run_load(config: PipelineConfig, input: PathBuf, format: OutputFormat) -> Result<()> {
    let cleaner = build_cleaner(&config)?;
    let backend = match &config.data_dir {
        Some(dir) => EmbeddedBackend::open(dir).with_context(|| format!("opening graph at {:?}", dir))?,
        None => {
            info!("No data directory configured; the graph will not outlive this process");
            EmbeddedBackend::in_memory()
        }
    };
    let source = JsonFileSource::open(&input).with_context(|| format!("opening {:?}", input))?;

    let pipeline = Pipeline::new(config, cleaner, backend);
    let result = pipeline.run(source).await;
    pipeline.close().await?;
    let summary = result?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Table => print_run_summary(&summary),
    }
    Ok(())
}

fn run_dry_run(config: PipelineConfig, input: PathBuf) -> Result<()> {
    let cleaner = build_cleaner(&config)?;
    let source = JsonFileSource::open(&input).with_context(|| format!("opening {:?}", input))?;

    let pipeline = Pipeline::new(config, cleaner, EmbeddedBackend::in_memory());
    let (records, summary) = pipeline.dry_run(source)?;

    println!("{}", serde_json::to_string_pretty(&records)?);
    info!(
        "Dry run: {} read, {} cleaned, {} skipped",
        summary.records_read, summary.records_cleaned, summary.records_skipped
    );
    eprintln!("{}", description_table(&summary.descriptions));
    Ok(())
}

fn run_infer(config: &PipelineConfig, text: &str, format: OutputFormat) -> Result<()> {
    let cleaner = build_cleaner(config)?;
    let inference = cleaner.engine().infer(Some(text));

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&inference)?),
        OutputFormat::Table => {
            let mut table = Table::new();
            table.set_header(vec!["route", "dosage_form"]);
            table.add_row(vec![inference.route, inference.dosage_form]);
            println!("{}", table);
        }
    }
    Ok(())
}

async fn run_stats(data_dir: PathBuf, format: OutputFormat) -> Result<()> {
    let backend = EmbeddedBackend::open(&data_dir).with_context(|| format!("opening graph at {:?}", data_dir))?;
    let summary = GraphSummary::from_store(&*backend.store().read().await);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Table => print_graph_summary(&summary),
    }
    Ok(())
}

fn print_run_summary(summary: &RunSummary) {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["metric", "value"]);
    for (metric, value) in [
        ("records read", summary.records_read),
        ("records loaded", summary.records_loaded),
        ("records skipped", summary.records_skipped),
        ("batches", summary.batches),
        ("nodes created", summary.nodes_created),
        ("edges created", summary.edges_created),
        ("properties set", summary.properties_set),
    ] {
        table.add_row(vec![metric.to_string(), value.to_string()]);
    }
    println!("{}", table);
    println!("{}", description_table(&summary.descriptions));
}

fn description_table(coverage: &DescriptionCoverage) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["drug descriptions", "count", "% of drugs", "% of described"]);
    let described = |value: usize| format!("{:.1}", coverage.percent_of_described(value));
    for (metric, value, of_described) in [
        ("total", coverage.total, None),
        ("null", coverage.null_description, None),
        ("empty", coverage.blank_description, None),
        ("with description", coverage.with_description, None),
        ("route inferred", coverage.route_inferred, Some(described(coverage.route_inferred))),
        ("dosage_form inferred", coverage.dosage_form_inferred, Some(described(coverage.dosage_form_inferred))),
        ("both inferred", coverage.both_inferred, Some(described(coverage.both_inferred))),
    ] {
        table.add_row(vec![
            metric.to_string(),
            value.to_string(),
            format!("{:.1}", coverage.percent(value)),
            of_described.unwrap_or_default(),
        ]);
    }
    table
}

fn print_graph_summary(summary: &GraphSummary) {
    let mut counts = Table::new();
    counts.set_content_arrangement(ContentArrangement::Dynamic);
    counts.set_header(vec!["kind", "name", "count"]);
    for (label, count) in &summary.labels {
        counts.add_row(vec!["node".to_string(), label.clone(), count.to_string()]);
    }
    for (edge_type, count) in &summary.edge_types {
        counts.add_row(vec!["edge".to_string(), edge_type.clone(), count.to_string()]);
    }
    println!("{}", counts);

    let coverage = &summary.coverage;
    let mut table = Table::new();
    table.set_header(vec!["STUDIED_IN", "count", "%"]);
    for (metric, value) in [
        ("total", coverage.total),
        ("with route", coverage.with_route),
        ("with dosage_form", coverage.with_dosage_form),
        ("with both", coverage.with_both),
        ("with any", coverage.with_any),
    ] {
        table.add_row(vec![
            metric.to_string(),
            value.to_string(),
            format!("{:.1}", coverage.percent(value)),
        ]);
    }
    println!("{}", table);
}
