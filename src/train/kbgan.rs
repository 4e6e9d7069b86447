//! KBGAN step: a generator model picks one hard negative per positive, the
//! main model trains against it, and the generator is rewarded with the main
//! model's score of its pick.

use rand::Rng;

use crate::confidence::generator::{EmbeddingGenerator, Episode, Generator};
use crate::graph::Triple;
use crate::model::optim::EmbeddingOptimizer;
use crate::model::{KgeModel, LossOptions, StepLog};
use crate::sampler::Batch;

/// Outcome of one KBGAN step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct KbganLog {
    /// Mean main-model score of the generator's picks.
    pub reward: f32,
    pub step: StepLog,
}

/// Run one KBGAN step on `batch`.
pub fn kbgan_step(
    model: &mut KgeModel,
    optimizer: &mut EmbeddingOptimizer,
    generator: &mut EmbeddingGenerator,
    batch: &Batch,
    opts: &LossOptions,
    rng: &mut impl Rng,
) -> KbganLog {
    if batch.is_empty() || batch.negative_size == 0 {
        return KbganLog::default();
    }

    let mut picks = Vec::with_capacity(batch.len());
    for i in 0..batch.len() {
        let candidates: Vec<Triple> = (0..batch.negative_size)
            .map(|k| batch.negative_triple(i, k))
            .collect();
        let chosen = generator.propose(model, &candidates, rng);
        picks.push((candidates, chosen));
    }

    let hard = Batch {
        positives: batch.positives.clone(),
        negatives: picks
            .iter()
            .map(|(c, j)| c[*j].corrupted_end(batch.mode))
            .collect(),
        weights: batch.weights.clone(),
        mode: batch.mode,
        negative_size: 1,
    };
    let step = model.train_step(optimizer, &hard, opts);

    let rewards: Vec<f32> = picks.iter().map(|(c, j)| model.score(&c[*j])).collect();
    let baseline = rewards.iter().sum::<f32>() / rewards.len() as f32;
    let episodes: Vec<Episode> = picks
        .into_iter()
        .zip(&rewards)
        .map(|((candidates, chosen), r)| Episode {
            candidates,
            chosen,
            advantage: r - baseline,
        })
        .collect();
    generator.reinforce(model, &episodes);

    KbganLog {
        reward: baseline,
        step,
    }
}
