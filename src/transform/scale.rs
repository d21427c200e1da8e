//! Constant-factor value scaling.

use crate::batch::{Batch, Record};
use crate::transform::BatchTransform;
use anyhow::Result;
use rayon::prelude::*;

/// Batches at or above this record count are mapped on the rayon pool.
const PARALLEL_THRESHOLD: usize = 8192;

/// Multiplies every record's value by a constant factor.
pub struct ScaleTransform {
    factor: f64,
}

impl ScaleTransform {
    /// Create a scale transform with the given factor.
    pub fn new(factor: f64) -> Self {
        Self { factor }
    }
}

impl BatchTransform for ScaleTransform {
    fn apply(&self, batch: Batch) -> Result<Batch> {
        let Batch { index, records } = batch;
        let factor = self.factor;

        let scale = |record: &Record| Record {
            id: record.id,
            value: record.value * factor,
        };

        let records = if records.len() >= PARALLEL_THRESHOLD {
            records.par_iter().map(scale).collect()
        } else {
            records.iter().map(scale).collect()
        };

        Ok(Batch::new(index, records))
    }
}
