//! CSV artifact writing over an object store.

use crate::batch::{Batch, Record};
use anyhow::{Context, Result};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use std::sync::Arc;

/// Writes one CSV artifact per transformed batch.
///
/// Artifacts are named by the persist stage's sequence counter
/// (`batch_00000.csv`, `batch_00001.csv`, ...), so names are unique and
/// collision-free across a run. Each write uploads the fully serialized batch
/// in a single put; a failed put leaves no partial artifact behind.
pub struct CsvSink {
    store: Arc<dyn ObjectStore>,
    prefix: Path,
}

impl CsvSink {
    /// Create a sink rooted at `prefix`, clearing artifacts left over from a
    /// previous run so sequence numbering starts against a clean prefix.
    pub async fn create(store: Arc<dyn ObjectStore>, prefix: &str) -> Result<Self> {
        let prefix_path = Path::from(prefix);

        let existing: Vec<_> = store.list(Some(&prefix_path)).collect::<Vec<_>>().await;

        if !existing.is_empty() {
            tracing::info!(
                "Deleting {} existing objects under {:?}",
                existing.len(),
                prefix_path
            );

            let store_ref = &store;
            let results: Vec<_> = stream::iter(existing)
                .filter_map(|result| async move { result.ok() })
                .map(|meta| async move {
                    let location = meta.location.clone();
                    match store_ref.delete(&meta.location).await {
                        Ok(_) => Ok(()),
                        Err(e) => {
                            tracing::warn!("Failed to delete {:?}: {}", location, e);
                            Err(e)
                        }
                    }
                })
                .buffer_unordered(16)
                .collect()
                .await;

            let deleted = results.iter().filter(|r| r.is_ok()).count();
            tracing::debug!("Deleted {} objects", deleted);
        }

        Ok(Self {
            store,
            prefix: prefix_path,
        })
    }

    /// Artifact location for a sequence number.
    pub fn artifact_path(&self, sequence: u64) -> Path {
        self.prefix.child(format!("batch_{:05}.csv", sequence))
    }

    /// Serialize one batch and durably write it, returning the bytes written.
    pub async fn write_batch(&self, sequence: u64, batch: &Batch) -> Result<u64> {
        let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
        for record in &batch.records {
            writer.serialize(record)?;
        }
        let data = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush CSV buffer: {}", e))?;
        let bytes = data.len() as u64;

        let path = self.artifact_path(sequence);
        self.store
            .put(&path, PutPayload::from(Bytes::from(data)))
            .await
            .with_context(|| format!("Failed to write artifact {}", path))?;

        tracing::debug!("Wrote {} ({} records, {} bytes)", path, batch.len(), bytes);
        Ok(bytes)
    }

    /// Read an artifact back as records. Used for output verification.
    pub async fn read_batch(&self, sequence: u64) -> Result<Vec<Record>> {
        let path = self.artifact_path(sequence);
        let data = self.store.get(&path).await?.bytes().await?;

        let mut reader = csv::Reader::from_reader(data.as_ref());
        let mut records = Vec::new();
        for record in reader.deserialize() {
            records.push(record?);
        }
        Ok(records)
    }

    /// List artifact locations under the prefix in sequence order.
    pub async fn list_artifacts(&self) -> Result<Vec<Path>> {
        let mut paths: Vec<Path> = self
            .store
            .list(Some(&self.prefix))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .filter_map(|result| result.ok())
            .map(|meta| meta.location)
            .filter(|location| {
                location
                    .filename()
                    .is_some_and(|name| name.starts_with("batch_") && name.ends_with(".csv"))
            })
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Write a run manifest next to the artifacts.
    pub async fn finalize(&self, artifacts: u64, records: u64) -> Result<()> {
        let manifest = serde_json::json!({
            "artifacts": artifacts,
            "records": records,
        });
        let body = serde_json::to_string_pretty(&manifest)?;

        let path = self.prefix.child("_manifest.json");
        self.store
            .put(&path, PutPayload::from(Bytes::from(body)))
            .await?;

        tracing::info!("Wrote manifest {}", path);
        Ok(())
    }
}
