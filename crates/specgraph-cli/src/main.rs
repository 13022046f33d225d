//! specgraph CLI: inspect and evaluate YAML transform graphs.

use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use specgraph_core::config::EngineConfig;
use specgraph_core::prelude::DataSpecId;
use specgraph_exec::{Engine, SourceCatalog};
use specgraph_planner::dsl::yaml::{parse_yaml_graph_with, DslError, ParsedGraph};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "specgraph")]
#[command(about = "Typed lazy transform graphs evaluated to Arrow batches", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a graph YAML file and check every dataset's schema
    Validate {
        /// Path to the graph YAML file
        #[arg(short, long)]
        graph: PathBuf,
    },

    /// Print the schema of one dataset
    Schema {
        #[arg(short, long)]
        graph: PathBuf,

        /// Dataset name
        #[arg(short, long)]
        dataset: String,
    },

    /// Evaluate one dataset and print its rows
    Show {
        #[arg(short, long)]
        graph: PathBuf,

        #[arg(short, long)]
        dataset: String,

        /// Rows per batch (overrides config)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Seed for sample/shuffle (overrides config)
        #[arg(long)]
        seed: Option<u64>,

        /// Stop after this many batches
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print the graph in Graphviz dot format
    Dot {
        #[arg(short, long)]
        graph: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Validate { graph } => validate(&graph).await,
        Commands::Schema { graph, dataset } => schema(&graph, &dataset).await,
        Commands::Show {
            graph,
            dataset,
            batch_size,
            seed,
            limit,
        } => show(&graph, &dataset, batch_size, seed, limit).await,
        Commands::Dot { graph } => dot(&graph),
    };
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load(path: &Path) -> CliResult<(ParsedGraph, EngineConfig)> {
    let yaml_content = fs::read_to_string(path)?;
    let catalog = SourceCatalog::new();
    let parsed = parse_yaml_graph_with(&yaml_content, |name, uri| {
        catalog.infer_type(uri).map_err(|e| DslError::Invalid {
            name: name.to_string(),
            msg: e.to_string(),
        })
    })?;
    let mut config = EngineConfig::from_env();
    parsed.config.apply_to(&mut config);
    config.validate()?;
    Ok((parsed, config))
}

fn lookup(parsed: &ParsedGraph, dataset: &str) -> CliResult<DataSpecId> {
    parsed
        .id(dataset)
        .ok_or_else(|| format!("no dataset named '{dataset}'").into())
}

async fn validate(path: &Path) -> CliResult<()> {
    let (parsed, config) = load(path)?;
    let names = parsed.datasets.clone();
    let engine = Engine::new(config, parsed.graph);
    for (name, id) in &names {
        let schema = engine.schema(id).await?;
        println!("  {name}: {}", schema.ty);
    }
    println!("✓ Graph is valid ({} datasets)", names.len());
    Ok(())
}

async fn schema(path: &Path, dataset: &str) -> CliResult<()> {
    let (parsed, config) = load(path)?;
    let id = lookup(&parsed, dataset)?;
    let engine = Engine::new(config, parsed.graph);
    let schema = engine.schema(&id).await?;
    print!("{}", serde_yaml::to_string(&schema)?);
    Ok(())
}

async fn show(
    path: &Path,
    dataset: &str,
    batch_size: Option<usize>,
    seed: Option<u64>,
    limit: Option<usize>,
) -> CliResult<()> {
    let (parsed, mut config) = load(path)?;
    if let Some(b) = batch_size {
        config = config.with_batch_size(b);
    }
    if let Some(s) = seed {
        config = config.with_seed(s);
    }
    config.validate()?;
    let id = lookup(&parsed, dataset)?;
    let batch_size = config.batch_size;
    let engine = Engine::new(config, parsed.graph);

    let mut stream = engine.to_arrow(&id, batch_size).await?;
    let mut shown = 0;
    let mut rows = 0;
    while let Some(batch) = stream.try_next().await? {
        if limit.is_some_and(|l| shown >= l) {
            break;
        }
        rows += batch.num_rows();
        println!("{}", arrow::util::pretty::pretty_format_batches(&[batch])?);
        shown += 1;
    }
    println!("{rows} rows in {shown} batches");
    Ok(())
}

fn dot(path: &Path) -> CliResult<()> {
    let (parsed, _) = load(path)?;
    print!("{}", parsed.graph.dot());
    Ok(())
}
