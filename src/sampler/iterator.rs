//! Endless batch streams.
//!
//! A [`BatchStream`] walks a shuffled dataset in `batch_size` chunks and
//! reshuffles when it runs out, so epoch boundaries never reach the caller.
//! A [`BidirectionalIterator`] alternates two streams, head-corruption first.
//!
//! Samples in a batch are drawn in parallel on the sampler pool. Each sample
//! gets an RNG derived from (stream seed, epoch, position), so batches do not
//! depend on how the pool schedules work.

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::ThreadPool;
use rayon::prelude::*;

use crate::error::TrainError;
use crate::graph::CorruptionMode;

use super::Batch;
use super::dataset::{Sample, TrainDataset};
use super::weights::WeightTable;

/// SplitMix64 finaliser, used to derive independent per-sample seeds.
fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Restartable, reshuffling batch producer over one dataset.
pub struct BatchStream {
    dataset: Arc<TrainDataset>,
    batch_size: usize,
    order: Vec<usize>,
    cursor: usize,
    epoch: u64,
    seed: u64,
    pool: Arc<ThreadPool>,
}

impl BatchStream {
    pub fn new(
        dataset: Arc<TrainDataset>,
        batch_size: usize,
        seed: u64,
        pool: Arc<ThreadPool>,
    ) -> Result<Self, TrainError> {
        if dataset.is_empty() {
            return Err(TrainError::EmptyDataset {
                name: dataset.mode().to_string(),
            });
        }
        let mut stream = Self {
            order: (0..dataset.len()).collect(),
            dataset,
            batch_size: batch_size.max(1),
            cursor: 0,
            epoch: 0,
            seed,
            pool,
        };
        stream.shuffle();
        Ok(stream)
    }

    fn shuffle(&mut self) {
        let mut rng = StdRng::seed_from_u64(mix(self.seed ^ mix(self.epoch)));
        self.order.shuffle(&mut rng);
        self.cursor = 0;
    }

    /// Next batch; the last batch of an epoch may be short.
    pub fn next_batch(&mut self) -> Batch {
        if self.cursor >= self.order.len() {
            self.epoch += 1;
            self.shuffle();
        }
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let picks = &self.order[self.cursor..end];
        let base = mix(self.seed ^ mix(self.epoch)).wrapping_add(self.cursor as u64);
        let dataset = &self.dataset;

        let samples: Vec<Sample> = self.pool.install(|| {
            picks
                .par_iter()
                .enumerate()
                .map(|(offset, &idx)| {
                    let mut rng = StdRng::seed_from_u64(mix(base.wrapping_add(offset as u64)));
                    dataset.sample(idx, &mut rng)
                })
                .collect()
        });

        self.cursor = end;
        Batch::collate(samples, dataset.mode(), dataset.negative_sample_size())
    }

    pub fn dataset(&self) -> &Arc<TrainDataset> {
        &self.dataset
    }

    /// Completed passes over the dataset.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Alternates head- and tail-corruption streams, one batch per call.
pub struct BidirectionalIterator {
    head: BatchStream,
    tail: BatchStream,
    step: u64,
}

impl BidirectionalIterator {
    pub fn new(head: BatchStream, tail: BatchStream) -> Self {
        debug_assert_eq!(head.dataset().mode(), CorruptionMode::HeadBatch);
        debug_assert_eq!(tail.dataset().mode(), CorruptionMode::TailBatch);
        Self { head, tail, step: 0 }
    }

    /// Even calls come from the head stream, odd calls from the tail stream.
    pub fn next_batch(&mut self) -> Batch {
        let batch = if self.step % 2 == 0 {
            self.head.next_batch()
        } else {
            self.tail.next_batch()
        };
        self.step += 1;
        batch
    }

    /// The positive triples both streams draw from.
    pub fn triples(&self) -> &[crate::graph::Triple] {
        self.head.dataset().triples()
    }

    /// The weight table the streams read.
    pub fn weights(&self) -> &WeightTable {
        self.head.dataset().weights()
    }

    pub fn head_dataset(&self) -> &Arc<TrainDataset> {
        self.head.dataset()
    }

    pub fn tail_dataset(&self) -> &Arc<TrainDataset> {
        self.tail.dataset()
    }
}

impl Iterator for BidirectionalIterator {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        Some(self.next_batch())
    }
}
