//! rmx-xref - Main entry point
//!
//! One subcommand per pipeline stage plus `run-all`, `verify` and
//! `orphans`. Every stage supports `--dry-run` and prints its summary as
//! JSON on stdout.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use rmx_common::config::{self, TomlConfig};
use rmx_common::db::init_database;
use rmx_xref::broker::SourceBroker;
use rmx_xref::pipeline::{read_terms, Pipeline, PipelineSettings};
use rmx_xref::seeds::{load_seed_dir, Seed};
use rmx_xref::store::SqliteStore;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for rmx-xref
#[derive(Parser, Debug)]
#[command(name = "rmx-xref")]
#[command(about = "Raw-material cross-reference pipeline")]
#[command(version)]
struct Args {
    /// Configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Root folder holding the database
    #[arg(short, long, global = true, env = "RMX_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Report intended changes without committing
    #[arg(long, global = true)]
    dry_run: bool,

    /// Log filter when RUST_LOG is not set
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug, Default)]
struct InputArgs {
    /// Terms file, one term per line
    #[arg(long)]
    terms: Option<PathBuf>,

    /// Seed directory (.json / .toml documents)
    #[arg(long)]
    seeds: Option<PathBuf>,

    /// Purge each source's rows before re-ingesting
    #[arg(long)]
    refresh: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Gather provider records and curated seeds into SourceItems
    Ingest(InputArgs),
    /// Parse, cluster and link derivatives
    Reconcile,
    /// Re-home clusters whose common name disagrees with their definition
    SplitConflicts,
    /// Recompute merged forms from source rows
    RebuildSpecs,
    /// Attach curated seed specs to merged forms
    LinkSeeds {
        /// Seed directory (.json / .toml documents)
        #[arg(long)]
        seeds: Option<PathBuf>,
    },
    /// All stages in order
    RunAll(InputArgs),
    /// Check the cluster forest and definition name agreement
    Verify,
    /// List orphan source items and seeds
    Orphans,
}

fn init_tracing(cli_level: Option<&str>, config: &TomlConfig) {
    let fallback = cli_level
        .map(str::to_string)
        .unwrap_or_else(|| match config.logging.level.as_str() {
            "" | "info" => "rmx_xref=info,rmx_common=info".to_string(),
            level => level.to_string(),
        });

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

fn load_seeds(cli_dir: Option<&Path>, config: &TomlConfig) -> Result<Vec<Seed>> {
    let dir = cli_dir.map(Path::to_path_buf).or_else(|| config.pipeline.seed_dir.clone());
    match dir {
        Some(dir) => load_seed_dir(&dir)
            .with_context(|| format!("Failed to load seeds from {}", dir.display())),
        None => {
            info!("No seed directory configured");
            Ok(Vec::new())
        }
    }
}

/// Terms file entries followed by seed names not already listed
fn load_terms(cli_file: Option<&Path>, config: &TomlConfig, seeds: &[Seed]) -> Result<Vec<String>> {
    let file = cli_file.map(Path::to_path_buf).or_else(|| config.pipeline.terms_file.clone());
    let mut terms = match file {
        Some(file) => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read terms file {}", file.display()))?;
            read_terms(&content)
        }
        None => Vec::new(),
    };
    for seed in seeds {
        if !terms.iter().any(|t| t.eq_ignore_ascii_case(seed.name())) {
            terms.push(seed.name().to_string());
        }
    }
    Ok(terms)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let config = config::load_config(args.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(args.log_level.as_deref(), &config);

    let root_folder = config::resolve_root_folder(args.root_folder.as_deref(), &config);
    let db_path = config::database_path(&root_folder);
    info!("Root folder: {}", root_folder.display());

    let pool = init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let settings = PipelineSettings::from_config(&config);
    let mut pipeline = Pipeline::new(SqliteStore::new(pool), settings, args.dry_run);
    if args.dry_run {
        info!("Dry run: changes will be reported, not committed");
    }

    let mut exit = ExitCode::SUCCESS;
    match &args.command {
        Command::Ingest(input) | Command::RunAll(input) => {
            let seeds = load_seeds(input.seeds.as_deref(), &config)?;
            let terms = load_terms(input.terms.as_deref(), &config, &seeds)?;
            let broker = SourceBroker::from_config(&config.sources).await;
            if broker.is_empty() {
                warn!("No providers available; only seeds will be ingested");
            }

            if matches!(args.command, Command::RunAll(_)) {
                let summaries = pipeline
                    .run_all(&broker, &terms, &seeds, input.refresh)
                    .await
                    .context("Pipeline run failed")?;
                print_json(&summaries)?;
            } else {
                let summary = pipeline
                    .ingest(&broker, &terms, &seeds, input.refresh)
                    .await
                    .context("Ingest failed")?;
                print_json(&summary)?;
            }
        }
        Command::Reconcile => {
            let summary = pipeline.reconcile().await.context("Reconcile failed")?;
            print_json(&summary)?;
        }
        Command::SplitConflicts => {
            let summary = pipeline
                .split_conflicts()
                .await
                .context("Conflict split failed")?;
            print_json(&summary)?;
        }
        Command::RebuildSpecs => {
            let summary = pipeline.rebuild_specs().await.context("Spec rebuild failed")?;
            print_json(&summary)?;
        }
        Command::LinkSeeds { seeds } => {
            let seeds = load_seeds(seeds.as_deref(), &config)?;
            let summary = pipeline.link_seeds(&seeds).await.context("Seed linking failed")?;
            print_json(&summary)?;
        }
        Command::Verify => {
            let report = pipeline.verify().await.context("Verification failed")?;
            print_json(&report)?;
            if !report.is_valid() {
                warn!(
                    forest_violations = report.forest.violations.len(),
                    conflicts = report.conflicts.len(),
                    "Invariant violations found"
                );
                exit = ExitCode::FAILURE;
            }
        }
        Command::Orphans => {
            let report = pipeline.orphans().await.context("Orphan listing failed")?;
            print_json(&report)?;
        }
    }

    pipeline.finish().await.context("Failed to finish run")?;
    Ok(exit)
}
