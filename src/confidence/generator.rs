//! Adversarial generators that pick one candidate out of a set of corruptions.
//!
//! A generator turns candidates into logits, a candidate is sampled from
//! `softmax(logits)`, and the generator is later pushed towards choices that
//! earned a high reward (REINFORCE with a batch-mean baseline).
//!
//! Two variants:
//! - [`EmbeddingGenerator`]: a second [`KgeModel`] scoring candidates itself
//! - [`NetworkGenerator`]: a [`SimpleNN`] over the main model's triple features

use ndarray::Array1;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::graph::Triple;
use crate::model::KgeModel;
use crate::model::kge::EmbeddingGrads;
use crate::model::network::SimpleNN;
use crate::model::optim::{EmbeddingOptimizer, Sgd};

/// One sampled choice and how much better than baseline it did.
#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    pub candidates: Vec<Triple>,
    pub chosen: usize,
    pub advantage: f32,
}

/// Proposes and learns from candidate selections.
pub trait Generator {
    /// Unnormalised preference for each candidate. `model` is the main model.
    fn candidate_logits(&self, model: &KgeModel, candidates: &[Triple]) -> Vec<f32>;

    /// One policy-gradient update over a batch of episodes.
    fn reinforce(&mut self, model: &KgeModel, episodes: &[Episode]);

    /// Sample a candidate index from `softmax(logits)`.
    fn propose(&self, model: &KgeModel, candidates: &[Triple], rng: &mut impl Rng) -> usize
    where
        Self: Sized,
    {
        sample_index(&softmax(&self.candidate_logits(model, candidates)), rng)
    }
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exp: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exp.iter().sum();
    exp.iter().map(|&x| x / sum).collect()
}

/// Inverse-CDF draw from a probability vector.
pub fn sample_index(probs: &[f32], rng: &mut impl Rng) -> usize {
    let u: f32 = rng.gen_range(0.0..1.0);
    let mut acc = 0.0;
    for (i, p) in probs.iter().enumerate() {
        acc += p;
        if u < acc {
            return i;
        }
    }
    probs.len().saturating_sub(1)
}

/// `∂/∂logits` of `−advantage · log softmax(logits)[chosen]`.
pub fn policy_gradient(logits: &[f32], chosen: usize, advantage: f32) -> Vec<f32> {
    softmax(logits)
        .into_iter()
        .enumerate()
        .map(|(j, p)| {
            let indicator = if j == chosen { 1.0 } else { 0.0 };
            -advantage * (indicator - p)
        })
        .collect()
}

/// KBGAN-style generator: its own embedding model, scores as logits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingGenerator {
    pub model: KgeModel,
    pub optimizer: EmbeddingOptimizer,
}

impl EmbeddingGenerator {
    pub fn new(model: KgeModel, learning_rate: f32) -> Self {
        let optimizer = EmbeddingOptimizer::new(learning_rate, &model);
        Self { model, optimizer }
    }
}

impl Generator for EmbeddingGenerator {
    fn candidate_logits(&self, _model: &KgeModel, candidates: &[Triple]) -> Vec<f32> {
        candidates.iter().map(|t| self.model.score(t)).collect()
    }

    fn reinforce(&mut self, model: &KgeModel, episodes: &[Episode]) {
        if episodes.is_empty() {
            return;
        }
        let scale = 1.0 / episodes.len() as f32;
        let mut grads = EmbeddingGrads::default();
        for ep in episodes {
            let logits = self.candidate_logits(model, &ep.candidates);
            let d = policy_gradient(&logits, ep.chosen, ep.advantage);
            for (t, g) in ep.candidates.iter().zip(d) {
                if g != 0.0 {
                    self.model.accumulate_score_grad(t, g * scale, &mut grads);
                }
            }
        }
        self.model.apply(&mut self.optimizer, &grads);
    }
}

/// Lightweight generator: a small network over the main model's features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkGenerator {
    pub network: SimpleNN,
    pub optimizer: Sgd,
}

impl NetworkGenerator {
    pub fn new(network: SimpleNN, learning_rate: f32) -> Self {
        Self {
            network,
            optimizer: Sgd::new(learning_rate),
        }
    }
}

impl Generator for NetworkGenerator {
    fn candidate_logits(&self, model: &KgeModel, candidates: &[Triple]) -> Vec<f32> {
        candidates
            .iter()
            .map(|t| self.network.logit(&model.features(t)))
            .collect()
    }

    fn reinforce(&mut self, model: &KgeModel, episodes: &[Episode]) {
        if episodes.is_empty() {
            return;
        }
        let scale = 1.0 / episodes.len() as f32;
        let mut grads = self.network.zero_grads();
        for ep in episodes {
            let features: Vec<Array1<f32>> =
                ep.candidates.iter().map(|t| model.features(t)).collect();
            let acts: Vec<_> = features.iter().map(|x| self.network.forward(x)).collect();
            let logits: Vec<f32> = acts.iter().map(|a| a.logit).collect();
            let d = policy_gradient(&logits, ep.chosen, ep.advantage);
            for ((x, act), g) in features.iter().zip(&acts).zip(d) {
                self.network.backward(x, act, g * scale, &mut grads);
            }
        }
        self.network.step_sgd(&self.optimizer, &grads);
    }
}

/// Either generator variant, as stored in a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnyGenerator {
    Embedding(EmbeddingGenerator),
    Network(NetworkGenerator),
}

impl AnyGenerator {
    /// Named parameter blocks and their shapes.
    pub fn parameter_shapes(&self) -> Vec<(&'static str, Vec<usize>)> {
        match self {
            AnyGenerator::Embedding(g) => g.model.parameter_shapes(),
            AnyGenerator::Network(g) => g.network.parameter_shapes(),
        }
    }
}

impl Generator for AnyGenerator {
    fn candidate_logits(&self, model: &KgeModel, candidates: &[Triple]) -> Vec<f32> {
        match self {
            AnyGenerator::Embedding(g) => g.candidate_logits(model, candidates),
            AnyGenerator::Network(g) => g.candidate_logits(model, candidates),
        }
    }

    fn reinforce(&mut self, model: &KgeModel, episodes: &[Episode]) {
        match self {
            AnyGenerator::Embedding(g) => g.reinforce(model, episodes),
            AnyGenerator::Network(g) => g.reinforce(model, episodes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelKind, ModelShape};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn main_model() -> KgeModel {
        let shape = ModelShape {
            kind: ModelKind::TransE,
            nentity: 5,
            nrelation: 1,
            hidden_dim: 4,
            gamma: 6.0,
            double_entity_embedding: false,
            double_relation_embedding: false,
        };
        KgeModel::new(shape, &mut StdRng::seed_from_u64(9)).unwrap()
    }

    fn candidates() -> Vec<Triple> {
        (1..5).map(|t| Triple::new(0, 0, t)).collect()
    }

    fn chosen_probability(g: &impl Generator, model: &KgeModel, chosen: usize) -> f32 {
        softmax(&g.candidate_logits(model, &candidates()))[chosen]
    }

    #[test]
    fn softmax_sums_to_one() {
        let p = softmax(&[1.0, 2.0, 3.0]);
        assert!((p.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(p[2] > p[1] && p[1] > p[0]);
    }

    #[test]
    fn sampling_follows_probabilities() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(sample_index(&[0.0, 1.0, 0.0], &mut rng), 1);
        let hits = (0..1000)
            .filter(|_| sample_index(&[0.8, 0.2], &mut rng) == 0)
            .count();
        assert!((700..900).contains(&hits), "{hits}");
    }

    #[test]
    fn policy_gradient_sums_to_zero() {
        let g = policy_gradient(&[0.1, 0.5, -0.3], 1, 2.0);
        assert!(g.iter().sum::<f32>().abs() < 1e-6);
        assert!(g[1] < 0.0);
    }

    #[test]
    fn positive_advantage_raises_choice_probability_network() {
        let model = main_model();
        let net = SimpleNN::new(4, 5, &mut StdRng::seed_from_u64(2));
        let mut g = NetworkGenerator::new(net, 0.5);
        let before = chosen_probability(&g, &model, 2);
        let ep = Episode {
            candidates: candidates(),
            chosen: 2,
            advantage: 1.0,
        };
        for _ in 0..20 {
            g.reinforce(&model, std::slice::from_ref(&ep));
        }
        assert!(chosen_probability(&g, &model, 2) > before);
    }

    #[test]
    fn positive_advantage_raises_choice_probability_embedding() {
        let model = main_model();
        let mut g = EmbeddingGenerator::new(main_model(), 0.05);
        let before = chosen_probability(&g, &model, 0);
        let ep = Episode {
            candidates: candidates(),
            chosen: 0,
            advantage: 1.0,
        };
        for _ in 0..20 {
            g.reinforce(&model, std::slice::from_ref(&ep));
        }
        assert!(chosen_probability(&g, &model, 0) > before);
    }
}
