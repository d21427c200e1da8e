//! Per-group factor lookup with a bounded cache.
//!
//! Records are grouped by `id % groups`; each group's scale factor comes from
//! a [`FactorProvider`], memoized in a caller-owned [`BoundedCache`] so the
//! provider is consulted once per group rather than once per record.

use crate::batch::{Batch, Record};
use crate::cache::BoundedCache;
use crate::transform::BatchTransform;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// Resolves the scale factor for a group key.
///
/// Stand-in seam for an external lookup service; implementations must be
/// deterministic for the transform contract to hold.
pub trait FactorProvider: Send + Sync {
    fn factor(&self, key: &str) -> Result<f64>;
}

/// Factor table backed by a fixed map, with an optional fallback.
pub struct StaticFactors {
    factors: HashMap<String, f64>,
    default: Option<f64>,
}

impl StaticFactors {
    /// Create a provider from a factor table. Keys missing from the table
    /// resolve to `default`, or fail the lookup when no default is set.
    pub fn new(factors: HashMap<String, f64>, default: Option<f64>) -> Self {
        Self { factors, default }
    }
}

impl FactorProvider for StaticFactors {
    fn factor(&self, key: &str) -> Result<f64> {
        match self.factors.get(key) {
            Some(factor) => Ok(*factor),
            None => self
                .default
                .ok_or_else(|| anyhow::anyhow!("No factor configured for {}", key)),
        }
    }
}

/// Scales each record by its group's factor.
pub struct LookupTransform {
    provider: Arc<dyn FactorProvider>,
    cache: Arc<BoundedCache<String, f64>>,
    groups: u64,
}

impl LookupTransform {
    /// Create a lookup transform. The cache is owned by the caller and may be
    /// shared with other consumers of the same provider.
    pub fn new(
        provider: Arc<dyn FactorProvider>,
        cache: Arc<BoundedCache<String, f64>>,
        groups: u64,
    ) -> Self {
        Self {
            provider,
            cache,
            groups,
        }
    }

    fn group_key(&self, id: u64) -> String {
        format!("group_{}", id % self.groups)
    }
}

impl BatchTransform for LookupTransform {
    fn apply(&self, batch: Batch) -> Result<Batch> {
        let Batch { index, records } = batch;

        // Lookups go through the shared cache, so records are resolved
        // sequentially rather than on the rayon pool.
        let mut out = Vec::with_capacity(records.len());
        for record in &records {
            let key = self.group_key(record.id);
            let factor = self
                .cache
                .get_or_insert_with(key.clone(), || self.provider.factor(&key))?;
            out.push(Record {
                id: record.id,
                value: record.value * factor,
            });
        }

        Ok(Batch::new(index, out))
    }
}
