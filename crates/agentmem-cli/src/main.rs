//! agentmem - inspect and feed trajectory archives from the command line.
//!
//! ## Commands
//!
//! - `ingest`: run a file of scenarios through the quality gates
//! - `list`: show archived trajectories, newest first
//! - `show`: print one archived trajectory
//! - `stats`: archive size and score distribution

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, Level};

use agentmem_core::{
    IngestionConfig, MemoryConfig, ScenarioIngestionPipeline, TrajectoryArchive, TrajectoryPool,
};

#[derive(Parser)]
#[command(name = "agentmem")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Agent memory trajectory archive tool", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// TOML configuration file (AGENTMEM_* variables still apply on top)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest scenarios from a JSON array or JSON Lines file
    Ingest {
        /// Scenario file
        #[arg(short, long)]
        input: PathBuf,

        /// Trajectory storage directory
        #[arg(long)]
        storage_dir: Option<PathBuf>,

        /// Minimum novelty_score
        #[arg(long)]
        novelty_threshold: Option<f64>,

        /// Lower bound of the accepted difficulty_score range
        #[arg(long)]
        difficulty_low: Option<f64>,

        /// Upper bound of the accepted difficulty_score range
        #[arg(long)]
        difficulty_high: Option<f64>,

        /// Maximum number of trajectory files kept on disk
        #[arg(long)]
        max_scenarios: Option<usize>,
    },

    /// List archived trajectories, newest first
    List {
        #[arg(long)]
        storage_dir: Option<PathBuf>,

        /// Maximum number of trajectories to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Print one archived trajectory as JSON
    Show {
        trajectory_id: String,

        #[arg(long)]
        storage_dir: Option<PathBuf>,
    },

    /// Archive size and success score statistics
    Stats {
        #[arg(long)]
        storage_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    agentmem_core::init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Ingest {
            input,
            storage_dir,
            novelty_threshold,
            difficulty_low,
            difficulty_high,
            max_scenarios,
        } => {
            let mut ingestion = config.ingestion.clone();
            if let Some(dir) = storage_dir {
                ingestion.storage_dir = dir;
            }
            if let Some(v) = novelty_threshold {
                ingestion.novelty_threshold = v;
            }
            if let Some(v) = difficulty_low {
                ingestion.difficulty_range.low = v;
            }
            if let Some(v) = difficulty_high {
                ingestion.difficulty_range.high = v;
            }
            if let Some(v) = max_scenarios {
                ingestion.max_scenarios = v;
            }
            cmd_ingest(&config, ingestion, &input).await
        }
        Commands::List { storage_dir, limit } => {
            cmd_list(&resolve_dir(&config, storage_dir), limit)
        }
        Commands::Show {
            trajectory_id,
            storage_dir,
        } => cmd_show(&resolve_dir(&config, storage_dir), &trajectory_id),
        Commands::Stats { storage_dir } => cmd_stats(&resolve_dir(&config, storage_dir)),
    }
}

fn load_config(path: Option<&Path>) -> Result<MemoryConfig> {
    match path {
        Some(p) => MemoryConfig::load(p)
            .with_context(|| format!("Failed to load configuration from {:?}", p)),
        None => MemoryConfig::from_env().context("Invalid AGENTMEM_* environment configuration"),
    }
}

fn resolve_dir(config: &MemoryConfig, storage_dir: Option<PathBuf>) -> PathBuf {
    storage_dir.unwrap_or_else(|| config.ingestion.storage_dir.clone())
}

/// Accepts either a JSON array of scenarios or one scenario per line.
fn parse_scenarios(text: &str) -> Result<Vec<Value>> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("Scenario file is not a valid JSON array");
    }
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("Invalid JSON on line {}", n + 1))
        })
        .collect()
}

async fn cmd_ingest(config: &MemoryConfig, ingestion: IngestionConfig, input: &Path) -> Result<()> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read scenario file {:?}", input))?;
    let scenarios = parse_scenarios(&text)?;
    info!(count = scenarios.len(), input = %input.display(), "ingesting scenarios");

    let pool = Arc::new(TrajectoryPool::from_config(&config.pool));
    let pipeline = Arc::new(
        ScenarioIngestionPipeline::new(ingestion, pool)
            .context("Failed to initialise ingestion pipeline")?,
    );

    let worker = Arc::clone(&pipeline);
    let report = tokio::task::spawn_blocking(move || worker.ingest_batch(scenarios))
        .await
        .context("Ingestion worker panicked")?
        .context("Ingestion batch aborted")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    println!(
        "Accepted {}, rejected {}; {} trajectories on disk",
        report.accepted.len(),
        report.rejected.len(),
        pipeline.stored_count()
    );
    Ok(())
}

/// Open an existing archive for reading. Unlike ingestion, never creates `dir`.
fn open_archive(dir: &Path) -> Result<TrajectoryArchive> {
    if !dir.is_dir() {
        anyhow::bail!("Storage directory not found: {:?}", dir);
    }
    TrajectoryArchive::open(dir).with_context(|| format!("Failed to open archive at {:?}", dir))
}

#[derive(Serialize)]
struct TrajectoryLine<'a> {
    trajectory_id: &'a str,
    ingested_at: String,
    success_score: f64,
    problem_diagnosis: &'a str,
}

fn cmd_list(dir: &Path, limit: usize) -> Result<()> {
    let archive = open_archive(dir)?;
    let trajectories = archive.load_recent(limit)?;
    if trajectories.is_empty() {
        println!("No trajectories in {:?}", dir);
        return Ok(());
    }
    for t in &trajectories {
        let line = TrajectoryLine {
            trajectory_id: &t.trajectory_id,
            ingested_at: t.ingested_at.to_rfc3339(),
            success_score: t.success_score,
            problem_diagnosis: &t.problem_diagnosis,
        };
        println!("{}", serde_json::to_string(&line)?);
    }
    Ok(())
}

fn cmd_show(dir: &Path, trajectory_id: &str) -> Result<()> {
    let archive = open_archive(dir)?;
    let trajectory = archive
        .load(trajectory_id)?
        .with_context(|| format!("Trajectory not found: {}", trajectory_id))?;
    if !trajectory.verify_digest() {
        anyhow::bail!(
            "Payload digest mismatch for {}: archive file was modified",
            trajectory_id
        );
    }
    println!("{}", serde_json::to_string_pretty(&trajectory)?);
    Ok(())
}

#[derive(Debug, Serialize, PartialEq)]
struct ArchiveStats {
    trajectories: usize,
    min_score: Option<f64>,
    max_score: Option<f64>,
    mean_score: Option<f64>,
}

fn score_stats(scores: &[f64]) -> ArchiveStats {
    let n = scores.len();
    ArchiveStats {
        trajectories: n,
        min_score: scores.iter().copied().reduce(f64::min),
        max_score: scores.iter().copied().reduce(f64::max),
        mean_score: (n > 0).then(|| scores.iter().sum::<f64>() / n as f64),
    }
}

fn cmd_stats(dir: &Path) -> Result<()> {
    let archive = open_archive(dir)?;
    let scores: Vec<f64> = archive
        .load_recent(archive.len())?
        .iter()
        .map(|t| t.success_score)
        .collect();
    println!("{}", serde_json::to_string_pretty(&score_stats(&scores))?);
    Ok(())
}
