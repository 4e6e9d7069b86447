//! Filtered link-prediction evaluation.
//!
//! Every evaluated triple is ranked twice, once per [`CorruptionMode`]:
//! the corrupted end is replaced by every entity, candidates that form other
//! known-true triples are masked out, and the true entity's position among
//! the rest is its rank.
//!
//! | Metric | Definition |
//! |---|---|
//! | MRR | mean of `1 / rank` |
//! | MR | mean rank |
//! | HITS@k | fraction with `rank ≤ k` |
//!
//! Rank is `1 + |{candidates with a strictly greater score}|`; ties resolve in
//! favour of the true entity.

pub mod detection;

use std::sync::Arc;

use rayon::prelude::*;

use crate::graph::index::TrueTripleIndex;
use crate::graph::{CorruptionMode, Triple};
use crate::model::KgeModel;

/// Averaged ranking metrics.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RankMetrics {
    pub mrr: f64,
    pub mr: f64,
    pub hits_at_1: f64,
    pub hits_at_3: f64,
    pub hits_at_10: f64,
    /// Number of `(triple, direction)` rankings.
    pub count: usize,
}

impl RankMetrics {
    pub fn from_ranks(ranks: &[usize]) -> Self {
        if ranks.is_empty() {
            return Self::default();
        }
        let n = ranks.len() as f64;
        let hits = |k: usize| ranks.iter().filter(|&&r| r <= k).count() as f64 / n;
        Self {
            mrr: ranks.iter().map(|&r| 1.0 / r as f64).sum::<f64>() / n,
            mr: ranks.iter().map(|&r| r as f64).sum::<f64>() / n,
            hits_at_1: hits(1),
            hits_at_3: hits(3),
            hits_at_10: hits(10),
            count: ranks.len(),
        }
    }

    /// Named values in log order.
    pub fn entries(&self) -> [(&'static str, f64); 5] {
        [
            ("MRR", self.mrr),
            ("MR", self.mr),
            ("HITS@1", self.hits_at_1),
            ("HITS@3", self.hits_at_3),
            ("HITS@10", self.hits_at_10),
        ]
    }

    pub fn summary(&self) -> String {
        format!(
            "MRR: {:.4} | MR: {:.1} | H@1: {:.3} | H@3: {:.3} | H@10: {:.3} (n={})",
            self.mrr, self.mr, self.hits_at_1, self.hits_at_3, self.hits_at_10, self.count
        )
    }
}

/// Filtered ranking over all entities.
#[derive(Debug, Clone)]
pub struct Evaluator {
    index: Arc<TrueTripleIndex>,
    test_batch_size: usize,
    test_log_steps: usize,
}

impl Evaluator {
    pub fn new(index: Arc<TrueTripleIndex>, test_batch_size: usize, test_log_steps: usize) -> Self {
        Self {
            index,
            test_batch_size: test_batch_size.max(1),
            test_log_steps: test_log_steps.max(1),
        }
    }

    /// Filtered rank of the true entity of `t` under `mode`.
    ///
    /// `scores` is scratch space of length `nentity`.
    pub fn rank(
        &self,
        model: &KgeModel,
        t: &Triple,
        mode: CorruptionMode,
        scores: &mut [f32],
    ) -> usize {
        model.score_candidates(t, mode, scores);
        let truth = t.corrupted_end(mode);
        let target = scores[truth as usize];
        let better = scores
            .iter()
            .enumerate()
            .filter(|&(e, &s)| {
                let e = e as u32;
                s > target && e != truth && !self.index.is_true_corruption(t, mode, e)
            })
            .count();
        1 + better
    }

    /// Rank every triple in both directions and average.
    pub fn evaluate(&self, model: &KgeModel, triples: &[Triple]) -> RankMetrics {
        let nentity = model.nentity();
        let total_steps = CorruptionMode::BOTH.len() * triples.len().div_ceil(self.test_batch_size);
        let mut ranks = Vec::with_capacity(2 * triples.len());
        let mut step = 0;

        for mode in CorruptionMode::BOTH {
            for chunk in triples.chunks(self.test_batch_size) {
                if step % self.test_log_steps == 0 {
                    tracing::info!("Evaluating the model... ({step}/{total_steps})");
                }
                let chunk_ranks: Vec<usize> = chunk
                    .par_iter()
                    .map_init(
                        || vec![0.0f32; nentity],
                        |scores, t| self.rank(model, t, mode, scores),
                    )
                    .collect();
                ranks.extend(chunk_ranks);
                step += 1;
            }
        }
        RankMetrics::from_ranks(&ranks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelKind, ModelShape};
    use rand::SeedableRng;

    #[test]
    fn metrics_from_ranks() {
        let m = RankMetrics::from_ranks(&[1, 2, 4, 20]);
        assert!((m.mrr - (1.0 + 0.5 + 0.25 + 0.05) / 4.0).abs() < 1e-12);
        assert!((m.mr - 6.75).abs() < 1e-12);
        assert_eq!(m.hits_at_1, 0.25);
        assert_eq!(m.hits_at_3, 0.5);
        assert_eq!(m.hits_at_10, 0.75);
        assert_eq!(m.count, 4);
    }

    #[test]
    fn empty_ranks_give_zeroes() {
        assert_eq!(RankMetrics::from_ranks(&[]), RankMetrics::default());
    }

    fn model() -> KgeModel {
        let shape = ModelShape {
            kind: ModelKind::TransE,
            nentity: 6,
            nrelation: 1,
            hidden_dim: 3,
            gamma: 6.0,
            double_entity_embedding: false,
            double_relation_embedding: false,
        };
        KgeModel::new(shape, &mut rand::rngs::StdRng::seed_from_u64(5)).unwrap()
    }

    /// The entity closest to `h + r` in L1, which TransE scores highest.
    fn best_tail(model: &KgeModel, h: u32) -> u32 {
        let mut scores = vec![0.0; 6];
        model.score_candidates(&Triple::new(h, 0, 0), CorruptionMode::TailBatch, &mut scores);
        (0..6u32)
            .max_by(|&a, &b| scores[a as usize].total_cmp(&scores[b as usize]))
            .unwrap_or(0)
    }

    #[test]
    fn top_scored_truth_ranks_first() {
        let model = model();
        let tail = best_tail(&model, 0);
        let t = Triple::new(0, 0, tail);
        let index = Arc::new(TrueTripleIndex::build([&[t][..]]));
        let eval = Evaluator::new(index, 4, 1000);
        let mut scores = vec![0.0; 6];
        assert_eq!(eval.rank(&model, &t, CorruptionMode::TailBatch, &mut scores), 1);
    }

    #[test]
    fn filtering_removes_other_true_triples() {
        let model = model();
        let best = best_tail(&model, 0);
        let other = (best + 1) % 6;
        let t = Triple::new(0, 0, other);
        let mut scores = vec![0.0; 6];

        let raw = Evaluator::new(Arc::new(TrueTripleIndex::build([&[t][..]])), 1, 1);
        let raw_rank = raw.rank(&model, &t, CorruptionMode::TailBatch, &mut scores);
        assert!(raw_rank >= 2);

        let known = [t, Triple::new(0, 0, best)];
        let filtered = Evaluator::new(Arc::new(TrueTripleIndex::build([&known[..]])), 1, 1);
        let filtered_rank = filtered.rank(&model, &t, CorruptionMode::TailBatch, &mut scores);
        assert_eq!(filtered_rank, raw_rank - 1);
    }

    #[test]
    fn evaluate_covers_both_directions() {
        let model = model();
        let triples = [Triple::new(0, 0, 1), Triple::new(2, 0, 3), Triple::new(4, 0, 5)];
        let index = Arc::new(TrueTripleIndex::build([&triples[..]]));
        let metrics = Evaluator::new(index, 2, 1).evaluate(&model, &triples);
        assert_eq!(metrics.count, 6);
        assert!(metrics.mr >= 1.0 && metrics.mr <= 6.0);
        assert!(metrics.mrr > 0.0 && metrics.mrr <= 1.0);
    }
}
