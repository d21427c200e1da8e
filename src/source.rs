//! Synthetic batch generation.

use crate::batch::{Batch, Record};
use crate::config::SourceConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Iterator producing `batches` batches of `batch_size` records each.
///
/// Record ids are globally sequential across batches, so batch `i` covers
/// ids `i * batch_size .. (i + 1) * batch_size`. Values are drawn uniformly
/// from `[0, value_range)`; a fixed seed makes the sequence reproducible.
pub struct SyntheticSource {
    config: SourceConfig,
    next_index: u64,
    rng: StdRng,
}

impl SyntheticSource {
    /// Create a source from run parameters.
    pub fn new(config: SourceConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            next_index: 0,
            rng,
        }
    }
}

impl Iterator for SyntheticSource {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.next_index >= self.config.batches {
            return None;
        }
        let index = self.next_index;
        self.next_index += 1;

        let base = index * self.config.batch_size as u64;
        let records = (0..self.config.batch_size)
            .map(|offset| Record {
                id: base + offset as u64,
                value: self.rng.gen_range(0.0..self.config.value_range),
            })
            .collect();

        Some(Batch::new(index, records))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.config.batches - self.next_index) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SyntheticSource {}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(batches: u64, batch_size: usize, seed: Option<u64>) -> SourceConfig {
        SourceConfig {
            batches,
            batch_size,
            value_range: 100.0,
            seed,
        }
    }

    #[test]
    fn test_batch_count_and_size() {
        let batches: Vec<Batch> = SyntheticSource::new(config(5, 200, Some(1))).collect();
        assert_eq!(batches.len(), 5);
        for batch in &batches {
            assert_eq!(batch.len(), 200);
        }
    }

    #[test]
    fn test_ids_sequential_across_batches() {
        let batches: Vec<Batch> = SyntheticSource::new(config(3, 100, Some(1))).collect();
        for (i, batch) in batches.iter().enumerate() {
            assert_eq!(batch.index, i as u64);
            assert_eq!(batch.records[0].id, i as u64 * 100);
            assert_eq!(batch.records[99].id, i as u64 * 100 + 99);
        }
    }

    #[test]
    fn test_values_in_range() {
        let batches: Vec<Batch> = SyntheticSource::new(config(2, 1000, Some(7))).collect();
        for batch in &batches {
            for record in &batch.records {
                assert!(record.value >= 0.0 && record.value < 100.0);
            }
        }
    }

    #[test]
    fn test_seed_reproducible() {
        let a: Vec<Batch> = SyntheticSource::new(config(2, 50, Some(42))).collect();
        let b: Vec<Batch> = SyntheticSource::new(config(2, 50, Some(42))).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_batches() {
        let mut source = SyntheticSource::new(config(0, 100, Some(1)));
        assert_eq!(source.len(), 0);
        assert!(source.next().is_none());
    }

    #[test]
    fn test_size_hint_exact() {
        let mut source = SyntheticSource::new(config(4, 10, Some(1)));
        assert_eq!(source.size_hint(), (4, Some(4)));
        source.next();
        assert_eq!(source.size_hint(), (3, Some(3)));
    }
}
