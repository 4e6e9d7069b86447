//! Learned triple confidence and the adversarial sub-loops around it.
//!
//! The [`ConfidenceClassifier`] maps a triple's feature vector (see
//! [`KgeModel::features`]) to a confidence in (0, 1). It never sees real/fake
//! labels: current weight-table entries act as soft pseudo-labels for training
//! triples and corrupted triples act as negatives. Its confidences are written
//! back into the shared [`WeightTable`], which reweights the main model's loss.
//!
//! - [`mode`]: soft/hard refresh state machine
//! - [`generator`]: candidate generators trained by policy gradient

pub mod generator;
pub mod mode;

use std::collections::HashSet;

use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::graph::Triple;
use crate::model::KgeModel;
use crate::model::network::{DEFAULT_HIDDEN, NetworkAdam, SimpleNN, bce_with_logit};
use crate::sampler::iterator::BidirectionalIterator;
use crate::sampler::weights::WeightTable;

use generator::{Episode, Generator, softmax};
use mode::ConfidenceMode;

/// Adam learning rate of the classifier.
pub const CLASSIFIER_LEARNING_RATE: f32 = 0.005;

/// SGD learning rate of the lightweight generator.
pub const GENERATOR_LEARNING_RATE: f32 = 1e-4;

/// Values logged after a classifier step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClassifierLog {
    pub positive_loss: f32,
    pub negative_loss: f32,
    pub classifier_loss: f32,
    /// Mean confidence on the batch positives.
    pub mean_confidence: f32,
}

impl ClassifierLog {
    pub fn entries(&self) -> Vec<(&'static str, f32)> {
        vec![
            ("classifier_positive_loss", self.positive_loss),
            ("classifier_negative_loss", self.negative_loss),
            ("classifier_loss", self.classifier_loss),
            ("mean_confidence", self.mean_confidence),
        ]
    }
}

/// Outcome of one weight-table refresh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefreshReport {
    pub mode: ConfidenceMode,
    /// Distinct triples whose weight was rewritten.
    pub updated: usize,
    /// Triples whose confidence fell below the threshold.
    pub judged_fake: usize,
    pub mean_confidence: f32,
}

impl RefreshReport {
    pub fn fake_fraction(&self) -> f32 {
        if self.updated == 0 {
            0.0
        } else {
            self.judged_fake as f32 / self.updated as f32
        }
    }
}

/// Values logged after a GAN step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GanLog {
    /// Mean classifier confidence of the generator's picks.
    pub reward: f32,
    pub generator_loss: f32,
    pub classifier_loss: f32,
}

/// Feed-forward confidence model with its own optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceClassifier {
    network: SimpleNN,
    optimizer: NetworkAdam,
    smoothing: f32,
    threshold: f32,
}

impl ConfidenceClassifier {
    /// `input_dim → 5 → 1` network with Adam at [`CLASSIFIER_LEARNING_RATE`].
    pub fn new(input_dim: usize, smoothing: f32, threshold: f32, rng: &mut impl Rng) -> Self {
        let network = SimpleNN::new(input_dim, DEFAULT_HIDDEN, rng);
        let optimizer = NetworkAdam::new(CLASSIFIER_LEARNING_RATE, &network);
        Self {
            network,
            optimizer,
            smoothing,
            threshold,
        }
    }

    pub fn network(&self) -> &SimpleNN {
        &self.network
    }

    /// Fresh optimizer state at `learning_rate`.
    pub fn reset_optimizer(&mut self, learning_rate: f32) {
        self.optimizer = NetworkAdam::new(learning_rate, &self.network);
    }

    /// Confidence of each triple under the current model embeddings.
    pub fn score(&self, model: &KgeModel, triples: &[Triple]) -> Vec<f32> {
        triples
            .par_iter()
            .map(|t| self.network.confidence(&model.features(t)))
            .collect()
    }

    /// BCE over `(triple, target, scale)` examples; one Adam step. Returns the loss.
    fn fit(&mut self, model: &KgeModel, examples: &[(Triple, f32, f32)]) -> f32 {
        let mut grads = self.network.zero_grads();
        let mut loss = 0.0;
        for &(t, target, scale) in examples {
            let x = model.features(&t);
            let act = self.network.forward(&x);
            let (l, d) = bce_with_logit(act.logit, target);
            loss += scale * l;
            self.network.backward(&x, &act, scale * d, &mut grads);
        }
        self.network.step_adam(&mut self.optimizer, &grads);
        loss
    }

    /// One step on the next classifier-pool batch.
    ///
    /// Positives are fitted towards their current table weight; every
    /// corruption in the batch is fitted towards 0. The two halves are
    /// averaged separately and weigh equally.
    pub fn train_classifier_step(
        &mut self,
        model: &KgeModel,
        iter: &mut BidirectionalIterator,
    ) -> ClassifierLog {
        let batch = iter.next_batch();
        if batch.is_empty() {
            return ClassifierLog::default();
        }
        let b = batch.len();
        let k = batch.negative_size.max(1);

        let positives: Vec<(Triple, f32, f32)> = batch
            .positives
            .iter()
            .zip(&batch.weights)
            .map(|(t, w)| (*t, w.clamp(0.0, 1.0), 0.5 / b as f32))
            .collect();
        let negatives: Vec<(Triple, f32, f32)> = (0..b)
            .flat_map(|i| (0..batch.negative_size).map(move |j| (i, j)))
            .map(|(i, j)| (batch.negative_triple(i, j), 0.0, 0.5 / (b * k) as f32))
            .collect();

        let mean_confidence = self.score(model, &batch.positives).iter().sum::<f32>() / b as f32;
        let positive_loss = self.loss_of(model, &positives);
        let negative_loss = self.loss_of(model, &negatives);
        let examples: Vec<_> = positives.into_iter().chain(negatives).collect();
        let classifier_loss = self.fit(model, &examples);

        ClassifierLog {
            positive_loss: 2.0 * positive_loss,
            negative_loss: 2.0 * negative_loss,
            classifier_loss,
            mean_confidence,
        }
    }

    fn loss_of(&self, model: &KgeModel, examples: &[(Triple, f32, f32)]) -> f32 {
        examples
            .iter()
            .map(|&(t, target, scale)| {
                let logit = self.network.logit(&model.features(&t));
                scale * bce_with_logit(logit, target).0
            })
            .sum()
    }

    /// Rewrite the weight of every distinct triple in `pools`.
    ///
    /// Soft mode blends `α·c + (1 − α)·w`; hard mode writes 1 when
    /// `c ≥ threshold` and 0 otherwise. Confidences are computed in parallel;
    /// writes happen on the calling thread.
    pub fn find_topk_triples(
        &self,
        model: &KgeModel,
        pools: &[&[Triple]],
        weights: &WeightTable,
        mode: ConfidenceMode,
    ) -> RefreshReport {
        let mut seen = HashSet::new();
        let candidates: Vec<Triple> = pools
            .iter()
            .flat_map(|p| p.iter().copied())
            .filter(|t| seen.insert(*t))
            .collect();
        let confidences = self.score(model, &candidates);

        let mut judged_fake = 0;
        for (t, &c) in candidates.iter().zip(&confidences) {
            if c < self.threshold {
                judged_fake += 1;
            }
            let updated = match mode {
                ConfidenceMode::Soft => {
                    self.smoothing * c + (1.0 - self.smoothing) * weights.get(t)
                }
                ConfidenceMode::Hard => {
                    if c >= self.threshold {
                        1.0
                    } else {
                        0.0
                    }
                }
            };
            weights.set(*t, updated);
        }

        let updated = candidates.len();
        let mean_confidence = if updated == 0 {
            0.0
        } else {
            confidences.iter().sum::<f32>() / updated as f32
        };
        tracing::debug!(
            %mode,
            updated,
            judged_fake,
            mean_confidence,
            "refreshed confidence weights"
        );
        RefreshReport {
            mode,
            updated,
            judged_fake,
            mean_confidence,
        }
    }

    /// Joint generator/classifier step on the next generator-pool batch.
    ///
    /// For each row the generator samples one of its corruptions; the reward
    /// is the classifier's confidence in that pick. The generator is updated
    /// with advantage `reward − mean reward`, then the classifier is refined
    /// with the positives towards their weights and the picks towards 0.
    pub fn train_gan_step<G: Generator>(
        &mut self,
        model: &KgeModel,
        generator: &mut G,
        iter: &mut BidirectionalIterator,
        rng: &mut impl Rng,
    ) -> GanLog {
        let batch = iter.next_batch();
        if batch.is_empty() || batch.negative_size == 0 {
            return GanLog::default();
        }
        let b = batch.len();

        let mut picks = Vec::with_capacity(b);
        let mut log_probs = Vec::with_capacity(b);
        for i in 0..b {
            let candidates: Vec<Triple> = (0..batch.negative_size)
                .map(|k| batch.negative_triple(i, k))
                .collect();
            let probs = softmax(&generator.candidate_logits(model, &candidates));
            let chosen = generator::sample_index(&probs, rng);
            log_probs.push(probs[chosen].max(f32::MIN_POSITIVE).ln());
            picks.push((candidates, chosen));
        }

        let chosen: Vec<Triple> = picks.iter().map(|(c, j)| c[*j]).collect();
        let rewards = self.score(model, &chosen);
        let baseline = rewards.iter().sum::<f32>() / b as f32;

        let episodes: Vec<Episode> = picks
            .into_iter()
            .zip(&rewards)
            .map(|((candidates, chosen), r)| Episode {
                candidates,
                chosen,
                advantage: r - baseline,
            })
            .collect();
        let generator_loss = -episodes
            .iter()
            .zip(&log_probs)
            .map(|(ep, lp)| ep.advantage * lp)
            .sum::<f32>()
            / b as f32;
        generator.reinforce(model, &episodes);

        let scale = 0.5 / b as f32;
        let examples: Vec<(Triple, f32, f32)> = batch
            .positives
            .iter()
            .zip(&batch.weights)
            .map(|(t, w)| (*t, w.clamp(0.0, 1.0), scale))
            .chain(chosen.iter().map(|t| (*t, 0.0, scale)))
            .collect();
        let classifier_loss = self.fit(model, &examples);

        GanLog {
            reward: baseline,
            generator_loss,
            classifier_loss,
        }
    }
}
