//! Per-batch transformations.

mod lookup;
mod scale;

pub use lookup::{FactorProvider, LookupTransform, StaticFactors};
pub use scale::ScaleTransform;

use crate::batch::Batch;
use anyhow::Result;

/// A pure, deterministic per-batch mapping.
///
/// Implementations consume the input batch and return a new batch with the
/// same index; the input has no further owners after the call. Determinism is
/// part of the contract: value-equal inputs must map to value-equal outputs.
pub trait BatchTransform: Send + Sync {
    /// Transform one batch.
    fn apply(&self, batch: Batch) -> Result<Batch>;
}
