//! Negative-sampling training dataset.
//!
//! A [`TrainDataset`] is one corruption-direction view over a list of
//! positive triples. Each sample draws its own negatives; there is no
//! negative pool shared across a batch.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::Rng;

use crate::graph::index::TrueTripleIndex;
use crate::graph::{CorruptionMode, Triple};

use super::weights::WeightTable;

/// Draw budget per requested negative before falling back to unfiltered draws.
pub const DRAWS_PER_NEGATIVE: usize = 64;

/// One positive triple with its corruptions.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub positive: Triple,
    /// Replacement entity ids for the corrupted end.
    pub negatives: Vec<u32>,
    pub mode: CorruptionMode,
    /// Subsampling / confidence weight at the time of sampling.
    pub weight: f32,
}

/// Positive triples plus everything needed to corrupt them.
#[derive(Debug)]
pub struct TrainDataset {
    triples: Arc<Vec<Triple>>,
    nentity: u32,
    negative_sample_size: usize,
    mode: CorruptionMode,
    index: Arc<TrueTripleIndex>,
    weights: WeightTable,
    fallback_warned: AtomicBool,
}

impl TrainDataset {
    pub fn new(
        triples: Arc<Vec<Triple>>,
        nentity: usize,
        negative_sample_size: usize,
        mode: CorruptionMode,
        index: Arc<TrueTripleIndex>,
        weights: WeightTable,
    ) -> Self {
        Self {
            triples,
            nentity: nentity as u32,
            negative_sample_size,
            mode,
            index,
            weights,
            fallback_warned: AtomicBool::new(false),
        }
    }

    /// Build the sample at position `idx`.
    pub fn sample(&self, idx: usize, rng: &mut impl Rng) -> Sample {
        let positive = self.triples[idx];
        Sample {
            positive,
            negatives: self.negatives_for(positive, rng),
            mode: self.mode,
            weight: self.weights.get(&positive),
        }
    }

    /// Draw `negative_sample_size` replacement ids for `positive`.
    ///
    /// Candidates are uniform over `[0, nentity)` and rejected when the
    /// corrupted triple is a known truth. After
    /// `DRAWS_PER_NEGATIVE * negative_sample_size` draws the remainder is
    /// filled without filtering.
    pub fn negatives_for(&self, positive: Triple, rng: &mut impl Rng) -> Vec<u32> {
        let wanted = self.negative_sample_size;
        let budget = wanted * DRAWS_PER_NEGATIVE;
        let mut negatives = Vec::with_capacity(wanted);
        let mut draws = 0;

        while negatives.len() < wanted && draws < budget {
            let candidate = rng.gen_range(0..self.nentity);
            draws += 1;
            if !self.index.is_true_corruption(&positive, self.mode, candidate) {
                negatives.push(candidate);
            }
        }

        if negatives.len() < wanted {
            if !self.fallback_warned.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    triple = %positive,
                    mode = %self.mode,
                    accepted = negatives.len(),
                    wanted,
                    "too few free entities for filtered negatives, filling unfiltered"
                );
            }
            while negatives.len() < wanted {
                negatives.push(rng.gen_range(0..self.nentity));
            }
        }
        negatives
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    pub fn triples(&self) -> &[Triple] {
        &self.triples
    }

    pub fn mode(&self) -> CorruptionMode {
        self.mode
    }

    pub fn negative_sample_size(&self) -> usize {
        self.negative_sample_size
    }

    pub fn weights(&self) -> &WeightTable {
        &self.weights
    }

    pub fn index(&self) -> &Arc<TrueTripleIndex> {
        &self.index
    }
}
