//! Negative sampling and batch streams.
//!
//! - [`weights::WeightTable`]: shared per-triple subsampling / confidence weights
//! - [`dataset::TrainDataset`]: per-triple filtered negative sampling
//! - [`Batch`]: collated samples of one corruption mode
//! - [`iterator::BidirectionalIterator`]: endless head/tail alternation

pub mod dataset;
pub mod iterator;
pub mod weights;

use std::sync::Arc;

use rayon::ThreadPool;

use crate::error::TrainError;
use crate::graph::{CorruptionMode, Triple};

use dataset::Sample;

/// A collated batch of samples sharing one corruption mode.
///
/// `negatives` is row-major `len() × negative_size`.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub positives: Vec<Triple>,
    pub negatives: Vec<u32>,
    pub weights: Vec<f32>,
    pub mode: CorruptionMode,
    pub negative_size: usize,
}

impl Batch {
    /// Stack samples into one batch.
    pub fn collate(samples: Vec<Sample>, mode: CorruptionMode, negative_size: usize) -> Self {
        let mut positives = Vec::with_capacity(samples.len());
        let mut negatives = Vec::with_capacity(samples.len() * negative_size);
        let mut weights = Vec::with_capacity(samples.len());
        for sample in samples {
            debug_assert_eq!(sample.mode, mode);
            debug_assert_eq!(sample.negatives.len(), negative_size);
            positives.push(sample.positive);
            negatives.extend_from_slice(&sample.negatives);
            weights.push(sample.weight);
        }
        Self {
            positives,
            negatives,
            weights,
            mode,
            negative_size,
        }
    }

    pub fn len(&self) -> usize {
        self.positives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positives.is_empty()
    }

    /// Replacement ids of row `i`.
    pub fn negatives_of(&self, i: usize) -> &[u32] {
        &self.negatives[i * self.negative_size..(i + 1) * self.negative_size]
    }

    /// The `k`-th corrupted triple of row `i`.
    pub fn negative_triple(&self, i: usize, k: usize) -> Triple {
        self.positives[i].corrupt(self.mode, self.negatives[i * self.negative_size + k])
    }
}

/// Sampler pool with `max(1, cpu_num / 2)` threads.
pub fn worker_pool(cpu_num: usize) -> Result<Arc<ThreadPool>, TrainError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads((cpu_num / 2).max(1))
        .thread_name(|i| format!("kge-sampler-{i}"))
        .build()
        .map(Arc::new)
        .map_err(|e| TrainError::ThreadPool {
            message: e.to_string(),
        })
}
