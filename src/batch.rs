//! Core data model: records, batches, and the messages that carry them
//! between stages.

use serde::{Deserialize, Serialize};

/// A single record: an identifier plus a numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: u64,
    pub value: f64,
}

/// An ordered group of records produced, transformed, and persisted as a unit.
///
/// Batches are immutable once produced: a stage consumes its input batch and
/// constructs a new one, so no batch is ever shared mutably across a stage
/// boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Producer-assigned position in the input sequence, starting at 0.
    pub index: u64,

    /// Records in this batch.
    pub records: Vec<Record>,
}

impl Batch {
    /// Create a batch from its index and records.
    pub fn new(index: u64, records: Vec<Record>) -> Self {
        Self { index, records }
    }

    /// Number of records in the batch.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the batch has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Identifies a pipeline stage in failure signals and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Transform,
    Persist,
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageKind::Transform => write!(f, "transform"),
            StageKind::Persist => write!(f, "persist"),
        }
    }
}

/// Item carried on a stage channel.
///
/// Termination travels in-band as an ordered marker rather than an
/// out-of-band closed flag, so a consumer observes it strictly after every
/// batch that preceded it. The enum makes the marker unconfusable with a
/// legitimate batch.
#[derive(Debug)]
pub enum Message {
    /// A batch in flight between stages.
    Batch(Batch),

    /// No more batches will arrive on this channel.
    EndOfStream,

    /// An upstream stage failed after emitting `sequence` batches.
    /// Distinguishable from a clean end-of-stream so downstream stages can
    /// stop without treating the run as complete.
    Aborted { stage: StageKind, sequence: u64 },
}
