//! Batchflow
//!
//! Staged batch pipeline: a producer feeds record batches through a transform
//! stage into a persist stage over bounded channels, writing one CSV artifact
//! per batch.
//!
//! # Architecture
//!
//! The pipeline consists of:
//!
//! - **Source**: Synthetic batch generation with run-parameterized count,
//!   size, and value range
//! - **Transform**: Pure per-batch mappings (constant scaling, or cached
//!   per-group factor lookup)
//! - **I/O**: CSV artifact writing over object_store, named by a strictly
//!   increasing sequence counter
//! - **Pipeline**: Stage orchestration over bounded channels with in-band
//!   termination markers and metrics
//!
//! # Usage
//!
//! ```no_run
//! use batchflow::{run_pipeline, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_file(&"config.yaml".into())?;
//!     let report = run_pipeline(config).await?;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod cache;
pub mod config;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod source;
pub mod transform;

pub use batch::{Batch, Message, Record, StageKind};
pub use cache::BoundedCache;
pub use config::{Config, ErrorPolicy, TransformConfig};
pub use error::PipelineError;
pub use io::CsvSink;
pub use pipeline::{Metrics, Pipeline, PipelineConfig, RunOutcome, RunReport};
pub use source::SyntheticSource;
pub use transform::{BatchTransform, LookupTransform, ScaleTransform, StaticFactors};

use anyhow::Result;
use std::sync::Arc;

/// Run the full pipeline with the given configuration.
pub async fn run_pipeline(config: Config) -> Result<RunReport> {
    config.validate()?;

    tracing::info!("Starting batch pipeline");
    tracing::info!(
        "Source: {} batches of {} records",
        config.source.batches,
        config.source.batch_size
    );
    tracing::info!("Output: {}", config.output.path_display());

    // Create the artifact sink
    let store = io::create_output_store(&config.output)?;
    let sink = Arc::new(CsvSink::create(store, &config.output.prefix).await?);

    // Create metrics
    let metrics = Metrics::new();

    // Build the configured transform
    let transform = build_transform(&config.transform, metrics.clone());

    // Create the batch source
    let source = SyntheticSource::new(config.source.clone());

    let pipeline_config = PipelineConfig {
        input_buffer: config.processing.input_buffer,
        output_buffer: config.processing.output_buffer,
        on_transform_error: config.processing.on_transform_error,
        enable_metrics: config.processing.enable_metrics,
        metrics_interval_secs: config.processing.metrics_interval_secs,
    };

    let pipeline = Pipeline::new(transform, sink.clone(), metrics.clone(), pipeline_config);

    tracing::info!("Starting batch processing...");
    let report = pipeline.run(source).await?;

    // Finalize with a manifest unless the run failed
    if !matches!(report.outcome, RunOutcome::Failed(_)) {
        sink.finalize(report.batches_persisted, report.records_persisted)
            .await?;
    }

    if let Some(ref path) = config.processing.metrics_output_path {
        let snapshot = metrics.snapshot();
        if let Err(e) = snapshot.save_to_file(path) {
            tracing::warn!("Failed to save metrics to {}: {}", path, e);
        }
    }

    tracing::info!("Pipeline run: {}", report);

    Ok(report)
}

/// Build the transform selected by configuration.
fn build_transform(
    config: &TransformConfig,
    metrics: Arc<Metrics>,
) -> Arc<dyn BatchTransform> {
    match config {
        TransformConfig::Scale { factor } => Arc::new(ScaleTransform::new(*factor)),
        TransformConfig::Lookup {
            groups,
            factors,
            default_factor,
            cache_capacity,
        } => {
            let provider = Arc::new(StaticFactors::new(
                factors.clone(),
                Some(*default_factor),
            ));
            let cache = Arc::new(BoundedCache::new(*cache_capacity, Some(metrics)));
            Arc::new(LookupTransform::new(provider, cache, *groups))
        }
    }
}

/// Build a Tokio runtime with the specified configuration.
pub fn build_runtime(worker_threads: Option<usize>) -> Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();

    if let Some(threads) = worker_threads {
        builder.worker_threads(threads);
    }

    builder.enable_all();

    Ok(builder.build()?)
}

/// Initialize the Rayon thread pool.
pub fn init_rayon(threads: Option<usize>) -> Result<()> {
    if let Some(threads) = threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
    }
    Ok(())
}
