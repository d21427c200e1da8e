//! Throughput monitoring and metrics collection.

use serde::{Serialize, Serializer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::interval;

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Metrics for the pipeline.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Batches sent by the producer
    pub batches_produced: AtomicU64,

    /// Batches transformed successfully
    pub batches_transformed: AtomicU64,

    /// Batches dropped by the skip error policy
    pub batches_skipped: AtomicU64,

    /// Batches durably persisted
    pub batches_persisted: AtomicU64,

    /// Records durably persisted
    pub records_persisted: AtomicU64,

    /// Total bytes written to the artifact store
    pub bytes_written: AtomicU64,

    /// Number of failed operations
    pub failures: AtomicU64,

    /// Start time
    start_time: Option<Instant>,

    // Per-stage timing (in microseconds for precision)
    /// Time spent transforming (microseconds)
    pub transform_us: AtomicU64,

    /// Time spent persisting (microseconds)
    pub persist_us: AtomicU64,

    // Cache metrics
    /// Factor lookup cache hits
    pub cache_hits: AtomicU64,

    /// Factor lookup cache misses
    pub cache_misses: AtomicU64,
}

impl Metrics {
    /// Create new metrics.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        })
    }

    /// Record a produced batch.
    pub fn add_batch_produced(&self) {
        self.batches_produced.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a transformed batch.
    pub fn add_batch_transformed(&self) {
        self.batches_transformed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a batch dropped by the skip policy.
    pub fn add_batch_skipped(&self) {
        self.batches_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a persisted batch.
    pub fn add_batch_persisted(&self) {
        self.batches_persisted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record persisted records.
    pub fn add_records_persisted(&self, count: u64) {
        self.records_persisted.fetch_add(count, Ordering::Relaxed);
    }

    /// Record bytes written.
    pub fn add_bytes_written(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a failure.
    pub fn add_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record time spent transforming (in microseconds).
    pub fn add_transform_time(&self, duration: Duration) {
        self.transform_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record time spent persisting (in microseconds).
    pub fn add_persist_time(&self, duration: Duration) {
        self.persist_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record a lookup cache hit.
    pub fn add_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a lookup cache miss.
    pub fn add_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start_time.map_or(Duration::ZERO, |t| t.elapsed())
    }

    /// Get write throughput in MB/s.
    pub fn write_throughput_mbps(&self) -> f64 {
        let bytes = self.bytes_written.load(Ordering::Relaxed);
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            (bytes as f64) / (1024.0 * 1024.0) / elapsed
        } else {
            0.0
        }
    }

    /// Get persisted batches per second.
    pub fn batches_per_second(&self) -> f64 {
        let batches = self.batches_persisted.load(Ordering::Relaxed);
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            batches as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            batches_produced: self.batches_produced.load(Ordering::Relaxed),
            batches_transformed: self.batches_transformed.load(Ordering::Relaxed),
            batches_skipped: self.batches_skipped.load(Ordering::Relaxed),
            batches_persisted: self.batches_persisted.load(Ordering::Relaxed),
            records_persisted: self.records_persisted.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            elapsed: self.elapsed(),
            write_throughput_mbps: self.write_throughput_mbps(),
            batches_per_second: self.batches_per_second(),
            transform_secs: self.transform_us.load(Ordering::Relaxed) as f64 / 1_000_000.0,
            persist_secs: self.persist_us.load(Ordering::Relaxed) as f64 / 1_000_000.0,
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub batches_produced: u64,
    pub batches_transformed: u64,
    pub batches_skipped: u64,
    pub batches_persisted: u64,
    pub records_persisted: u64,
    pub bytes_written: u64,
    pub failures: u64,
    #[serde(serialize_with = "serialize_duration")]
    pub elapsed: Duration,
    pub write_throughput_mbps: f64,
    pub batches_per_second: f64,
    /// Total time spent transforming (seconds)
    pub transform_secs: f64,
    /// Total time spent persisting (seconds)
    pub persist_secs: f64,
    /// Lookup cache hits
    pub cache_hits: u64,
    /// Lookup cache misses
    pub cache_misses: u64,
}

impl MetricsSnapshot {
    /// Save metrics to a JSON file.
    pub fn save_to_file(&self, path: &str) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!("Metrics saved to {}", path);
        Ok(())
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let total_stage_time = self.transform_secs + self.persist_secs;
        let (transform_pct, persist_pct) = if total_stage_time > 0.0 {
            (
                self.transform_secs / total_stage_time * 100.0,
                self.persist_secs / total_stage_time * 100.0,
            )
        } else {
            (0.0, 0.0)
        };

        let cache_total = self.cache_hits + self.cache_misses;
        let cache_hit_rate = if cache_total > 0 {
            self.cache_hits as f64 / cache_total as f64 * 100.0
        } else {
            0.0
        };

        write!(
            f,
            "Batches: {} produced, {} transformed, {} skipped, {} persisted | \
             Records: {} | Written: {:.2} MB @ {:.2} MB/s | \
             Rate: {:.1} batches/s | Failures: {} | Elapsed: {:.1}s | \
             Time: transform {:.0}% | persist {:.0}% | Cache: {:.0}%",
            self.batches_produced,
            self.batches_transformed,
            self.batches_skipped,
            self.batches_persisted,
            self.records_persisted,
            self.bytes_written as f64 / (1024.0 * 1024.0),
            self.write_throughput_mbps,
            self.batches_per_second,
            self.failures,
            self.elapsed.as_secs_f64(),
            transform_pct,
            persist_pct,
            cache_hit_rate,
        )
    }
}

/// Periodic metrics reporter.
pub struct MetricsReporter {
    metrics: Arc<Metrics>,
    interval_secs: u64,
    total_batches: u64,
}

impl MetricsReporter {
    /// Create a new metrics reporter.
    pub fn new(metrics: Arc<Metrics>, interval_secs: u64, total_batches: u64) -> Self {
        Self {
            metrics,
            interval_secs,
            total_batches,
        }
    }

    /// Start the periodic reporter.
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) {
        let mut ticker = interval(Duration::from_secs(self.interval_secs));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let snapshot = self.metrics.snapshot();
                    let progress = if self.total_batches > 0 {
                        (snapshot.batches_persisted + snapshot.batches_skipped) as f64
                            / self.total_batches as f64
                            * 100.0
                    } else {
                        0.0
                    };

                    tracing::info!("[{:.1}%] {}", progress, snapshot);
                }
                _ = shutdown.recv() => {
                    let snapshot = self.metrics.snapshot();
                    tracing::info!("Final: {}", snapshot);
                    break;
                }
            }
        }
    }

    /// Print a final summary.
    pub fn print_summary(&self) {
        let snapshot = self.metrics.snapshot();

        println!("\n=== Pipeline Summary ===");
        println!("Total time: {:.1}s", snapshot.elapsed.as_secs_f64());
        println!("Batches produced: {}", snapshot.batches_produced);
        println!("Batches transformed: {}", snapshot.batches_transformed);
        println!("Batches skipped: {}", snapshot.batches_skipped);
        println!("Batches persisted: {}", snapshot.batches_persisted);
        println!("Records persisted: {}", snapshot.records_persisted);
        println!(
            "Data written: {:.2} MB",
            snapshot.bytes_written as f64 / (1024.0 * 1024.0)
        );
        println!(
            "Write throughput: {:.2} MB/s",
            snapshot.write_throughput_mbps
        );
        println!("Processing rate: {:.1} batches/s", snapshot.batches_per_second);
        println!("Failures: {}", snapshot.failures);

        let total_stage = snapshot.transform_secs + snapshot.persist_secs;
        if total_stage > 0.0 {
            println!("\n--- Stage Time Breakdown ---");
            println!(
                "Transform: {:>7.2}s ({:>5.1}%)",
                snapshot.transform_secs,
                snapshot.transform_secs / total_stage * 100.0
            );
            println!(
                "Persist:   {:>7.2}s ({:>5.1}%)",
                snapshot.persist_secs,
                snapshot.persist_secs / total_stage * 100.0
            );
        }

        let cache_total = snapshot.cache_hits + snapshot.cache_misses;
        if cache_total > 0 {
            let hit_rate = snapshot.cache_hits as f64 / cache_total as f64 * 100.0;
            println!(
                "\nLookup cache: {} hits, {} misses ({:.1}% hit rate)",
                snapshot.cache_hits, snapshot.cache_misses, hit_rate
            );
        }
        println!("========================\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_increment() {
        let metrics = Metrics::new();

        metrics.add_bytes_written(1000);
        metrics.add_bytes_written(500);

        assert_eq!(metrics.bytes_written.load(Ordering::Relaxed), 1500);
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = Metrics::new();

        metrics.add_batch_produced();
        metrics.add_batch_produced();
        metrics.add_batch_transformed();
        metrics.add_batch_persisted();
        metrics.add_records_persisted(100);

        let snapshot = metrics.snapshot();

        assert_eq!(snapshot.batches_produced, 2);
        assert_eq!(snapshot.batches_transformed, 1);
        assert_eq!(snapshot.batches_persisted, 1);
        assert_eq!(snapshot.records_persisted, 100);
    }

    #[test]
    fn test_all_counters() {
        let metrics = Metrics::new();

        metrics.add_batch_produced();
        metrics.add_batch_transformed();
        metrics.add_batch_skipped();
        metrics.add_batch_persisted();
        metrics.add_records_persisted(10);
        metrics.add_bytes_written(2048);
        metrics.add_failure();
        metrics.add_cache_hit();
        metrics.add_cache_miss();

        let snapshot = metrics.snapshot();

        assert_eq!(snapshot.batches_produced, 1);
        assert_eq!(snapshot.batches_transformed, 1);
        assert_eq!(snapshot.batches_skipped, 1);
        assert_eq!(snapshot.batches_persisted, 1);
        assert_eq!(snapshot.records_persisted, 10);
        assert_eq!(snapshot.bytes_written, 2048);
        assert_eq!(snapshot.failures, 1);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_misses, 1);
    }

    #[test]
    fn test_timing_metrics() {
        let metrics = Metrics::new();

        metrics.add_transform_time(Duration::from_millis(100));
        metrics.add_persist_time(Duration::from_millis(50));

        let snapshot = metrics.snapshot();

        assert!((snapshot.transform_secs - 0.1).abs() < 0.001);
        assert!((snapshot.persist_secs - 0.05).abs() < 0.001);
    }

    #[test]
    fn test_snapshot_display() {
        let snapshot = MetricsSnapshot {
            batches_produced: 5,
            batches_transformed: 5,
            batches_skipped: 0,
            batches_persisted: 5,
            records_persisted: 100_000,
            bytes_written: 2 * 1024 * 1024,
            failures: 1,
            elapsed: Duration::from_secs(10),
            write_throughput_mbps: 0.2,
            batches_per_second: 0.5,
            transform_secs: 3.0,
            persist_secs: 1.0,
            cache_hits: 80,
            cache_misses: 20,
        };

        let display = format!("{}", snapshot);

        assert!(display.contains("5 produced"));
        assert!(display.contains("5 persisted"));
        assert!(display.contains("100000"));
        assert!(display.contains("Failures: 1"));
        assert!(display.contains("Cache: 80%"));
    }

    #[test]
    fn test_zero_elapsed_no_panic() {
        // Metrics without a start time report zero rates
        let metrics = Metrics {
            start_time: None,
            ..Default::default()
        };

        metrics.add_bytes_written(1000);

        assert_eq!(metrics.write_throughput_mbps(), 0.0);
        assert_eq!(metrics.batches_per_second(), 0.0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = Metrics::new();
        metrics.add_batch_persisted();
        let json = serde_json::to_string(&metrics.snapshot()).unwrap();
        assert!(json.contains("\"batches_persisted\":1"));
    }

    #[test]
    fn test_metrics_reporter_new() {
        let metrics = Metrics::new();
        let reporter = MetricsReporter::new(metrics, 10, 5);

        assert_eq!(reporter.interval_secs, 10);
        assert_eq!(reporter.total_batches, 5);
    }
}
