//! Batchflow pipeline CLI
//!
//! Staged batch pipeline: generate record batches, transform them, and
//! persist one CSV artifact per batch.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use batchflow::{build_runtime, init_rayon, run_pipeline, Config, RunOutcome};

#[derive(Parser)]
#[command(name = "batchflow")]
#[command(about = "Run a staged batch transform + persist pipeline", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    /// Override the number of batches
    #[arg(long, global = true)]
    batches: Option<u64>,

    /// Override the batch size
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline (default if no command specified)
    Run,

    /// Analyze the work without processing
    Analyze,

    /// Validate configuration
    Validate,

    /// Generate a sample configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config.yaml")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        None | Some(Commands::Run) => {
            run_command(cli.config, cli.batches, cli.batch_size)?;
        }

        Some(Commands::Analyze) => {
            analyze_command(cli.config, cli.batches, cli.batch_size)?;
        }

        Some(Commands::Validate) => {
            validate_command(cli.config)?;
        }

        Some(Commands::GenerateConfig { output }) => {
            generate_config_command(output)?;
        }
    }

    Ok(())
}

fn apply_overrides(config: &mut Config, batches: Option<u64>, batch_size: Option<usize>) {
    if let Some(n) = batches {
        config.source.batches = n;
    }
    if let Some(n) = batch_size {
        config.source.batch_size = n;
    }
}

fn run_command(
    config_path: PathBuf,
    batches: Option<u64>,
    batch_size: Option<usize>,
) -> Result<()> {
    let mut config = Config::from_file(&config_path)?;
    apply_overrides(&mut config, batches, batch_size);
    config.validate()?;

    // Initialize Rayon
    init_rayon(config.processing.rayon_threads)?;

    // Build and run Tokio runtime
    let runtime = build_runtime(config.processing.worker_threads)?;
    let report = runtime.block_on(async { run_pipeline(config).await })?;

    println!("{}", report);

    if let RunOutcome::Failed(error) = &report.outcome {
        anyhow::bail!("Pipeline failed: {}", error);
    }

    Ok(())
}

fn analyze_command(
    config_path: PathBuf,
    batches: Option<u64>,
    batch_size: Option<usize>,
) -> Result<()> {
    let mut config = Config::from_file(&config_path)?;
    apply_overrides(&mut config, batches, batch_size);
    config.validate()?;

    // Rough per-record CSV line size for the id,value format
    const ESTIMATED_RECORD_BYTES: u64 = 26;

    let total_records = config.source.batches * config.source.batch_size as u64;
    let estimated_bytes = total_records * ESTIMATED_RECORD_BYTES;

    println!("\n=== Work Analysis ===");
    println!("Batches: {}", config.source.batches);
    println!("Records per batch: {}", config.source.batch_size);
    println!("Total records: {}", total_records);
    println!("Artifacts to write: {}", config.source.batches);
    println!("Output: {}", config.output.path_display());
    println!(
        "Estimated output size: {:.1} MB",
        estimated_bytes as f64 / (1024.0 * 1024.0)
    );
    println!("=====================\n");

    Ok(())
}

fn validate_command(config_path: PathBuf) -> Result<()> {
    let config = Config::from_file(&config_path)?;
    config.validate()?;
    println!("Configuration is valid");
    Ok(())
}

fn generate_config_command(output: PathBuf) -> Result<()> {
    // Generate a commented YAML config
    let yaml = r#"# Batchflow pipeline configuration

# === SOURCE: Synthetic batch generation ===
source:
  # Number of batches to produce
  batches: 5

  # Records per batch
  batch_size: 20000

  # Values are drawn uniformly from [0, value_range)
  value_range: 100.0

  # RNG seed for reproducible runs (omit for a random seed)
  # seed: 42

# === OUTPUT: Where artifacts are written ===
# Choose ONE of: local_path (filesystem) OR memory (in-process, smoke runs)
output:
  # Option 1: Write artifacts to a local directory
  local_path: "/tmp/batchflow-out"

  # Option 2: Keep artifacts in memory (comment out local_path)
  # memory: true

  # Path prefix for artifacts within the store
  prefix: "batches"

# === TRANSFORM: Per-batch mapping ===
transform:
  # Multiply every value by a constant factor
  kind: scale
  factor: 2.0

  # Or: resolve a per-group factor through a cached lookup
  # kind: lookup
  # groups: 10
  # factors:
  #   group_0: 1.5
  #   group_1: 2.5
  # default_factor: 1.0
  # cache_capacity: 1024

# === PROCESSING: Pipeline tuning ===
processing:
  # Buffer sizes of the stage channels (backpressure bounds)
  input_buffer: 4
  output_buffer: 4

  # Transform failure policy: fail_fast halts the run, skip drops the batch
  on_transform_error: fail_fast

  # Tokio async worker threads (null = num CPUs)
  # worker_threads: 4

  # Rayon thread pool size for CPU-bound transforms (null = num CPUs)
  # rayon_threads: 4

  # Print throughput metrics during processing
  enable_metrics: true

  # Metrics reporting interval in seconds
  metrics_interval_secs: 10

  # Optional path to save metrics JSON after the run completes
  # metrics_output_path: "metrics.json"
"#;

    std::fs::write(&output, yaml)?;
    println!("Generated sample configuration at: {}", output.display());

    Ok(())
}
