//! Staged pipeline execution.
//!
//! The pipeline is split into stages connected by bounded channels:
//!
//! ```text
//! ┌──────────┐     ┌───────────┐     ┌──────────┐
//! │ Producer │────▶│ Transform │────▶│ Persist  │
//! │          │     │  Stage    │     │  Stage   │
//! └──────────┘     └───────────┘     └──────────┘
//!       │               │                 │
//!    input_tx        input_rx          output_rx
//! ```
//!
//! Bounded channels give backpressure: the producer suspends when the
//! transform stage falls behind, and the transform stage suspends when
//! persistence falls behind. Termination travels downstream as an in-band
//! [`Message::EndOfStream`] marker; a stage failure travels as a distinct
//! [`Message::Aborted`] marker so the next stage stops instead of blocking
//! forever.
//!
//! Each channel has exactly one consumer, so transformed batches reach the
//! persist stage in production order and the persist stage's sequence counter
//! matches batch indices in a clean run.

use crate::batch::{Batch, Message, StageKind};
use crate::config::ErrorPolicy;
use crate::error::PipelineError;
use crate::io::CsvSink;
use crate::pipeline::{Metrics, MetricsReporter};
use crate::transform::BatchTransform;
use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Configuration for the staged pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Buffer size of the producer → transform channel
    pub input_buffer: usize,

    /// Buffer size of the transform → persist channel
    pub output_buffer: usize,

    /// Policy for transform failures
    pub on_transform_error: ErrorPolicy,

    /// Enable progress reporting
    pub enable_metrics: bool,

    /// Metrics reporting interval in seconds
    pub metrics_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_buffer: 4,
            output_buffer: 4,
            on_transform_error: ErrorPolicy::FailFast,
            enable_metrics: false,
            metrics_interval_secs: 10,
        }
    }
}

/// Staged pipeline executor.
pub struct Pipeline {
    transform: Arc<dyn BatchTransform>,
    sink: Arc<CsvSink>,
    metrics: Arc<Metrics>,
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline.
    pub fn new(
        transform: Arc<dyn BatchTransform>,
        sink: Arc<CsvSink>,
        metrics: Arc<Metrics>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            transform,
            sink,
            metrics,
            config,
        }
    }

    /// Run the pipeline over a finite batch source.
    ///
    /// Sends every batch followed by exactly one end-of-stream marker, then
    /// waits for both stages to drain and terminate. The returned report
    /// states whether the run completed fully, partially (skipped batches),
    /// or failed, with the failure attributed to a sequence number.
    pub async fn run(&self, source: impl IntoIterator<Item = Batch>) -> Result<RunReport> {
        let source = source.into_iter();
        let expected = source.size_hint().1.map(|n| n as u64).unwrap_or(0);

        let (input_tx, input_rx) = mpsc::channel::<Message>(self.config.input_buffer);
        let (output_tx, output_rx) = mpsc::channel::<Message>(self.config.output_buffer);

        let transform_handle = self.spawn_transform_stage(input_rx, output_tx);
        let persist_handle = self.spawn_persist_stage(output_rx);

        // Metrics reporter
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let reporter_handle = if self.config.enable_metrics {
            let reporter = MetricsReporter::new(
                self.metrics.clone(),
                self.config.metrics_interval_secs,
                expected,
            );
            Some(tokio::spawn(reporter.run(shutdown_rx)))
        } else {
            drop(shutdown_rx);
            None
        };

        // Producer: drain the source into the input channel, then send the
        // termination marker. A closed channel means a downstream stage died;
        // stop producing and let the stage results tell the story.
        let mut produced: u64 = 0;
        for batch in source {
            tracing::debug!("Queueing batch {} ({} records)", batch.index, batch.len());
            if input_tx.send(Message::Batch(batch)).await.is_err() {
                tracing::debug!("Input channel closed, stopping producer");
                break;
            }
            produced += 1;
            self.metrics.add_batch_produced();
        }
        let _ = input_tx.send(Message::EndOfStream).await;
        drop(input_tx);

        // Wait for both stages to terminate
        let transform_result = transform_handle.await?;
        let persist_result = persist_handle.await?;

        // Shutdown metrics reporter
        let _ = shutdown_tx.send(()).await;
        if let Some(handle) = reporter_handle {
            let _ = handle.await;
        }

        let (persisted, records) = match &persist_result {
            Ok(summary) => (summary.persisted, summary.records),
            Err(_) => {
                let snapshot = self.metrics.snapshot();
                (snapshot.batches_persisted, snapshot.records_persisted)
            }
        };

        // When persistence fails, the transform stage also errors once its
        // send side collapses; the persist error is the root cause.
        let outcome = match (transform_result, persist_result) {
            (_, Err(persist_err)) => RunOutcome::Failed(persist_err),
            (Err(transform_err), Ok(_)) => RunOutcome::Failed(transform_err),
            (Ok(summary), Ok(_)) => {
                if summary.skipped > 0 {
                    RunOutcome::Partial {
                        skipped: summary.skipped,
                    }
                } else {
                    RunOutcome::Complete
                }
            }
        };

        if self.config.enable_metrics {
            let reporter = MetricsReporter::new(
                self.metrics.clone(),
                self.config.metrics_interval_secs,
                expected,
            );
            reporter.print_summary();
        }

        Ok(RunReport {
            outcome,
            batches_produced: produced,
            batches_persisted: persisted,
            records_persisted: records,
        })
    }

    /// Spawn the transform stage: pops batches from the input channel,
    /// applies the per-batch mapping on the blocking pool, and pushes derived
    /// batches downstream.
    fn spawn_transform_stage(
        &self,
        mut input_rx: mpsc::Receiver<Message>,
        output_tx: mpsc::Sender<Message>,
    ) -> JoinHandle<Result<TransformSummary, PipelineError>> {
        let transform = self.transform.clone();
        let metrics = self.metrics.clone();
        let policy = self.config.on_transform_error;

        tokio::spawn(async move {
            let mut summary = TransformSummary::default();

            while let Some(message) = input_rx.recv().await {
                match message {
                    Message::Batch(batch) => {
                        let sequence = batch.index;
                        let size = batch.len();
                        let transform = transform.clone();

                        let start = Instant::now();
                        let result =
                            tokio::task::spawn_blocking(move || transform.apply(batch)).await;
                        metrics.add_transform_time(start.elapsed());

                        let derived = match result {
                            Ok(Ok(derived)) => derived,
                            Ok(Err(e)) => match policy {
                                ErrorPolicy::FailFast => {
                                    metrics.add_failure();
                                    let _ = output_tx
                                        .send(Message::Aborted {
                                            stage: StageKind::Transform,
                                            sequence,
                                        })
                                        .await;
                                    return Err(PipelineError::Transform {
                                        sequence,
                                        reason: e,
                                    });
                                }
                                ErrorPolicy::Skip => {
                                    tracing::warn!(
                                        "Transform failed for batch {}: {} (skipping)",
                                        sequence,
                                        e
                                    );
                                    metrics.add_failure();
                                    metrics.add_batch_skipped();
                                    summary.skipped += 1;
                                    continue;
                                }
                            },
                            Err(join_err) => {
                                metrics.add_failure();
                                let _ = output_tx
                                    .send(Message::Aborted {
                                        stage: StageKind::Transform,
                                        sequence,
                                    })
                                    .await;
                                return Err(PipelineError::Transform {
                                    sequence,
                                    reason: anyhow::anyhow!(
                                        "transform task panicked: {}",
                                        join_err
                                    ),
                                });
                            }
                        };

                        tracing::debug!("Transformed batch {} ({} records)", sequence, size);
                        metrics.add_batch_transformed();

                        if output_tx.send(Message::Batch(derived)).await.is_err() {
                            tracing::debug!("Output channel closed, stopping transform stage");
                            return Err(PipelineError::ChannelClosed);
                        }
                        summary.transformed += 1;
                    }
                    Message::EndOfStream => {
                        tracing::debug!("Transform stage draining downstream");
                        let _ = output_tx.send(Message::EndOfStream).await;
                        tracing::debug!("Transform stage terminated");
                        return Ok(summary);
                    }
                    Message::Aborted { stage, sequence } => {
                        tracing::warn!(
                            "Transform stage observed {} abort after {} batches",
                            stage,
                            sequence
                        );
                        let _ = output_tx.send(Message::Aborted { stage, sequence }).await;
                        return Ok(summary);
                    }
                }
            }

            Err(PipelineError::ChannelClosed)
        })
    }

    /// Spawn the persist stage: pops transformed batches and durably writes
    /// each one under its own strictly increasing sequence counter.
    fn spawn_persist_stage(
        &self,
        mut output_rx: mpsc::Receiver<Message>,
    ) -> JoinHandle<Result<PersistSummary, PipelineError>> {
        let sink = self.sink.clone();
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            // Owned exclusively by this stage; incremented once per
            // successful write, never reset during a run.
            let mut sequence: u64 = 0;
            let mut records: u64 = 0;

            while let Some(message) = output_rx.recv().await {
                match message {
                    Message::Batch(batch) => {
                        let start = Instant::now();
                        let write_result = sink.write_batch(sequence, &batch).await;
                        metrics.add_persist_time(start.elapsed());

                        match write_result {
                            Ok(bytes) => {
                                tracing::debug!(
                                    "Persisted artifact {} ({} records)",
                                    sequence,
                                    batch.len()
                                );
                                metrics.add_batch_persisted();
                                metrics.add_records_persisted(batch.len() as u64);
                                metrics.add_bytes_written(bytes);
                                records += batch.len() as u64;
                                sequence += 1;
                            }
                            Err(e) => {
                                metrics.add_failure();
                                return Err(PipelineError::Persist {
                                    sequence,
                                    reason: e,
                                });
                            }
                        }
                    }
                    Message::EndOfStream => {
                        tracing::debug!(
                            "Persist stage terminated after {} artifacts",
                            sequence
                        );
                        return Ok(PersistSummary {
                            persisted: sequence,
                            records,
                        });
                    }
                    Message::Aborted {
                        stage,
                        sequence: aborted_at,
                    } => {
                        tracing::warn!(
                            "{} stage aborted after {} batches; persist stage stopping",
                            stage,
                            aborted_at
                        );
                        return Ok(PersistSummary {
                            persisted: sequence,
                            records,
                        });
                    }
                }
            }

            Err(PipelineError::ChannelClosed)
        })
    }
}

/// Transform stage totals.
#[derive(Debug, Default)]
struct TransformSummary {
    transformed: u64,
    skipped: u64,
}

/// Persist stage totals.
#[derive(Debug, Default)]
struct PersistSummary {
    persisted: u64,
    records: u64,
}

/// How a pipeline run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// Every produced batch was transformed and persisted.
    Complete,

    /// The run finished, but the skip policy dropped some batches.
    Partial { skipped: u64 },

    /// A stage failed; artifacts exist for sequences below the reported
    /// persisted count.
    Failed(PipelineError),
}

impl RunOutcome {
    /// Check if the run completed without loss.
    pub fn is_complete(&self) -> bool {
        matches!(self, RunOutcome::Complete)
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Complete => write!(f, "complete"),
            RunOutcome::Partial { skipped } => write!(f, "partial ({} skipped)", skipped),
            RunOutcome::Failed(error) => write!(f, "failed: {}", error),
        }
    }
}

/// Report from a pipeline run.
#[derive(Debug)]
pub struct RunReport {
    /// How the run ended
    pub outcome: RunOutcome,

    /// Batches the producer pushed into the pipeline
    pub batches_produced: u64,

    /// Artifacts durably written
    pub batches_persisted: u64,

    /// Records durably written
    pub records_persisted: u64,
}

impl RunReport {
    /// Sequence number of the last successfully persisted artifact, if any.
    pub fn last_persisted_sequence(&self) -> Option<u64> {
        self.batches_persisted.checked_sub(1)
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Produced: {}, Persisted: {} ({} records), Outcome: {}",
            self.batches_produced, self.batches_persisted, self.records_persisted, self.outcome
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_config_default() {
        let config = PipelineConfig::default();
        assert_eq!(config.input_buffer, 4);
        assert_eq!(config.output_buffer, 4);
        assert_eq!(config.on_transform_error, ErrorPolicy::FailFast);
        assert!(!config.enable_metrics);
    }

    #[test]
    fn test_run_outcome_display() {
        assert_eq!(RunOutcome::Complete.to_string(), "complete");
        assert_eq!(
            RunOutcome::Partial { skipped: 2 }.to_string(),
            "partial (2 skipped)"
        );
        let failed = RunOutcome::Failed(PipelineError::ChannelClosed);
        assert!(failed.to_string().starts_with("failed:"));
    }

    #[test]
    fn test_run_report_display() {
        let report = RunReport {
            outcome: RunOutcome::Complete,
            batches_produced: 5,
            batches_persisted: 5,
            records_persisted: 100_000,
        };

        let display = format!("{}", report);
        assert!(display.contains("Produced: 5"));
        assert!(display.contains("Persisted: 5"));
        assert!(display.contains("complete"));
    }

    #[test]
    fn test_last_persisted_sequence() {
        let mut report = RunReport {
            outcome: RunOutcome::Complete,
            batches_produced: 0,
            batches_persisted: 0,
            records_persisted: 0,
        };
        assert_eq!(report.last_persisted_sequence(), None);

        report.batches_persisted = 3;
        assert_eq!(report.last_persisted_sequence(), Some(2));
    }
}
