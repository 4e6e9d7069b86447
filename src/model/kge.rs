//! Knowledge-graph embedding model with the self-adversarial negative loss.

use std::collections::HashMap;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Zip};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{CheckpointError, ConfigError};
use crate::graph::{CorruptionMode, Triple};
use crate::sampler::Batch;

use super::network::{log_sigmoid, sigmoid};
use super::optim::EmbeddingOptimizer;
use super::scoring::{ModelKind, ScoreParams, TripleGrads};

/// Everything needed to build an untrained model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelShape {
    pub kind: ModelKind,
    pub nentity: usize,
    pub nrelation: usize,
    pub hidden_dim: usize,
    pub gamma: f32,
    pub double_entity_embedding: bool,
    pub double_relation_embedding: bool,
}

impl ModelShape {
    /// Reject doubling flags the scoring family cannot use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hidden_dim == 0 {
            return Err(ConfigError::InvalidValue {
                field: "hidden_dim".into(),
                message: "must be positive".into(),
            });
        }
        let (entity, relation) = self.kind.required_doubling();
        let reason = match (
            entity == self.double_entity_embedding,
            relation == self.double_relation_embedding,
        ) {
            (true, true) => return Ok(()),
            (false, _) if entity => "a single-width entity embedding",
            (false, _) => "--double-entity-embedding",
            (_, false) if relation => "a single-width relation embedding",
            (_, false) => "--double-relation-embedding",
        };
        Err(ConfigError::IncompatibleModel {
            model: self.kind.to_string(),
            reason: reason.into(),
        })
    }

    pub fn entity_dim(&self) -> usize {
        if self.double_entity_embedding {
            2 * self.hidden_dim
        } else {
            self.hidden_dim
        }
    }

    pub fn relation_dim(&self) -> usize {
        if self.double_relation_embedding {
            2 * self.hidden_dim
        } else {
            self.hidden_dim
        }
    }
}

/// Knobs of the negative-sampling loss.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossOptions {
    /// `Some(α)` enables self-adversarial weighting `softmax(α·s⁻)`.
    pub adversarial_temperature: Option<f32>,
    /// Ignore per-triple weights and average uniformly.
    pub uni_weight: bool,
    /// L3 coefficient; 0 disables the term.
    pub regularization: f32,
}

impl Default for LossOptions {
    fn default() -> Self {
        Self {
            adversarial_temperature: None,
            uni_weight: false,
            regularization: 0.0,
        }
    }
}

/// Logged values of one training step.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StepLog {
    pub positive_sample_loss: f32,
    pub negative_sample_loss: f32,
    pub regularization: Option<f32>,
    pub loss: f32,
}

impl StepLog {
    /// Named values in log order.
    pub fn entries(&self) -> Vec<(&'static str, f32)> {
        let mut out = vec![
            ("positive_sample_loss", self.positive_sample_loss),
            ("negative_sample_loss", self.negative_sample_loss),
        ];
        if let Some(reg) = self.regularization {
            out.push(("regularization", reg));
        }
        out.push(("loss", self.loss));
        out
    }
}

/// Loss values and their gradients with respect to the raw scores.
#[derive(Debug, Clone, PartialEq)]
pub struct LossTerms {
    pub positive_sample_loss: f32,
    pub negative_sample_loss: f32,
    pub loss: f32,
    /// `∂loss/∂s⁺`, one per row.
    pub d_positive: Array1<f32>,
    /// `∂loss/∂s⁻`, shaped `B × K`.
    pub d_negative: Array2<f32>,
}

/// Weighted negative-sampling loss over precomputed scores.
///
/// Rows are normalised by `w / Σw` (or `1/B` with `uni_weight`). A batch whose
/// weights sum to zero contributes nothing.
pub fn negative_sampling_loss(
    positive: ArrayView1<f32>,
    negative: ArrayView2<f32>,
    weights: &[f32],
    opts: &LossOptions,
) -> LossTerms {
    let (b, k) = negative.dim();
    let norm: Array1<f32> = if opts.uni_weight {
        Array1::from_elem(b, 1.0 / b.max(1) as f32)
    } else {
        let total: f32 = weights.iter().sum();
        if total > 0.0 {
            weights.iter().map(|w| w / total).collect()
        } else {
            Array1::zeros(b)
        }
    };

    let mut pos_loss = 0.0;
    let mut neg_loss = 0.0;
    let mut d_positive = Array1::zeros(b);
    let mut d_negative = Array2::zeros((b, k));

    for (i, row) in negative.rows().into_iter().enumerate() {
        let probs = match opts.adversarial_temperature {
            Some(alpha) => {
                let max = row.fold(f32::NEG_INFINITY, |m, &s| m.max(alpha * s));
                let exp = row.mapv(|s| (alpha * s - max).exp());
                let z = exp.sum();
                exp / z
            }
            None => Array1::from_elem(k, 1.0 / k as f32),
        };

        let row_neg = Zip::from(&probs)
            .and(row)
            .fold(0.0, |acc, &p, &s| acc + p * log_sigmoid(-s));
        let n = norm[i];
        pos_loss -= n * log_sigmoid(positive[i]);
        neg_loss -= n * row_neg;

        d_positive[i] = -0.5 * n * sigmoid(-positive[i]);
        Zip::from(d_negative.row_mut(i))
            .and(&probs)
            .and(row)
            .for_each(|d, &p, &s| *d = 0.5 * n * p * sigmoid(s));
    }

    LossTerms {
        positive_sample_loss: pos_loss,
        negative_sample_loss: neg_loss,
        loss: (pos_loss + neg_loss) / 2.0,
        d_positive,
        d_negative,
    }
}

/// Row-sparse gradients for the two embedding tables.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingGrads {
    pub entity: HashMap<u32, Array1<f32>>,
    pub relation: HashMap<u32, Array1<f32>>,
}

impl EmbeddingGrads {
    pub fn is_empty(&self) -> bool {
        self.entity.is_empty() && self.relation.is_empty()
    }
}

/// Entity and relation embeddings scored by one [`ModelKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KgeModel {
    shape: ModelShape,
    params: ScoreParams,
    entity_embedding: Array2<f32>,
    relation_embedding: Array2<f32>,
}

impl KgeModel {
    /// Embeddings drawn uniformly from `[-range, range]`.
    pub fn new(shape: ModelShape, rng: &mut impl Rng) -> Result<Self, ConfigError> {
        shape.validate()?;
        let params = ScoreParams::new(shape.gamma, shape.hidden_dim);
        let range = params.embedding_range;
        let mut init = |rows: usize, cols: usize| {
            Array2::from_shape_simple_fn((rows, cols), || rng.gen_range(-range..=range))
        };
        let entity_embedding = init(shape.nentity, shape.entity_dim());
        let relation_embedding = init(shape.nrelation, shape.relation_dim());
        Ok(Self {
            shape,
            params,
            entity_embedding,
            relation_embedding,
        })
    }

    pub fn shape(&self) -> &ModelShape {
        &self.shape
    }

    pub fn kind(&self) -> ModelKind {
        self.shape.kind
    }

    pub fn nentity(&self) -> usize {
        self.shape.nentity
    }

    pub fn hidden_dim(&self) -> usize {
        self.shape.hidden_dim
    }

    /// Length of the vector produced by [`KgeModel::features`].
    pub fn feature_dim(&self) -> usize {
        self.shape.hidden_dim
    }

    pub fn entity_embedding(&self) -> &Array2<f32> {
        &self.entity_embedding
    }

    pub fn relation_embedding(&self) -> &Array2<f32> {
        &self.relation_embedding
    }

    pub fn entity(&self, id: u32) -> ArrayView1<'_, f32> {
        self.entity_embedding.row(id as usize)
    }

    pub fn relation(&self, id: u32) -> ArrayView1<'_, f32> {
        self.relation_embedding.row(id as usize)
    }

    /// Named parameter blocks and their shapes.
    pub fn parameter_shapes(&self) -> Vec<(&'static str, Vec<usize>)> {
        vec![
            ("entity_embedding", self.entity_embedding.shape().to_vec()),
            ("relation_embedding", self.relation_embedding.shape().to_vec()),
        ]
    }

    /// Fail when a restored model does not fit the current run.
    ///
    /// The margin travels with the parameters, so `gamma` is not compared.
    pub fn check_compatible(&self, expected: &ModelShape) -> Result<(), CheckpointError> {
        let own = ModelShape {
            gamma: expected.gamma,
            ..self.shape
        };
        if own == *expected {
            Ok(())
        } else {
            Err(CheckpointError::ShapeMismatch {
                message: format!("checkpoint has {:?}, run expects {:?}", self.shape, expected),
            })
        }
    }

    pub fn score(&self, t: &Triple) -> f32 {
        self.kind().score(
            &self.params,
            self.entity(t.head),
            self.relation(t.relation),
            self.entity(t.tail),
        )
    }

    /// Scores of `t` with its `mode` end replaced by every entity, written into `out`.
    pub fn score_candidates(&self, t: &Triple, mode: CorruptionMode, out: &mut [f32]) {
        debug_assert_eq!(out.len(), self.shape.nentity);
        let (kind, p) = (self.kind(), &self.params);
        let r = self.relation(t.relation);
        let rows = out.iter_mut().zip(self.entity_embedding.rows());
        match mode {
            CorruptionMode::HeadBatch => {
                let tail = self.entity(t.tail);
                for (slot, head) in rows {
                    *slot = kind.score(p, head, r, tail);
                }
            }
            CorruptionMode::TailBatch => {
                let head = self.entity(t.head);
                for (slot, tail) in rows {
                    *slot = kind.score(p, head, r, tail);
                }
            }
        }
    }

    /// Scores of a batch: positives, and negatives shaped `B × K`.
    pub fn score_batch(&self, batch: &Batch) -> (Array1<f32>, Array2<f32>) {
        let positive = batch.positives.iter().map(|t| self.score(t)).collect();
        let negative = Array2::from_shape_fn((batch.len(), batch.negative_size), |(i, k)| {
            self.score(&batch.negative_triple(i, k))
        });
        (positive, negative)
    }

    /// Classifier input for `t`; length [`KgeModel::feature_dim`].
    pub fn features(&self, t: &Triple) -> Array1<f32> {
        self.kind().combine(
            &self.params,
            self.entity(t.head),
            self.relation(t.relation),
            self.entity(t.tail),
        )
    }

    /// Add `scale · ∂score(t)/∂embeddings` into `grads`.
    pub fn accumulate_score_grad(&self, t: &Triple, scale: f32, grads: &mut EmbeddingGrads) {
        let mut local = TripleGrads::zeros(self.shape.entity_dim(), self.shape.relation_dim());
        self.kind().accumulate_grad(
            &self.params,
            self.entity(t.head),
            self.relation(t.relation),
            self.entity(t.tail),
            scale,
            &mut local,
        );
        add_row(&mut grads.entity, t.head, &local.head);
        add_row(&mut grads.entity, t.tail, &local.tail);
        add_row(&mut grads.relation, t.relation, &local.relation);
    }

    /// Apply accumulated gradients with the row-sparse optimizer.
    pub fn apply(&mut self, optimizer: &mut EmbeddingOptimizer, grads: &EmbeddingGrads) {
        optimizer.entity.step_rows(&mut self.entity_embedding, &grads.entity);
        optimizer.relation.step_rows(&mut self.relation_embedding, &grads.relation);
    }

    /// One gradient step on the weighted negative-sampling loss.
    pub fn train_step(
        &mut self,
        optimizer: &mut EmbeddingOptimizer,
        batch: &Batch,
        opts: &LossOptions,
    ) -> StepLog {
        let (positive, negative) = self.score_batch(batch);
        let terms = negative_sampling_loss(positive.view(), negative.view(), &batch.weights, opts);

        let mut grads = EmbeddingGrads::default();
        for (i, t) in batch.positives.iter().enumerate() {
            self.accumulate_score_grad(t, terms.d_positive[i], &mut grads);
            for (k, &g) in terms.d_negative.row(i).iter().enumerate() {
                if g != 0.0 {
                    self.accumulate_score_grad(&batch.negative_triple(i, k), g, &mut grads);
                }
            }
        }

        let mut log = StepLog {
            positive_sample_loss: terms.positive_sample_loss,
            negative_sample_loss: terms.negative_sample_loss,
            regularization: None,
            loss: terms.loss,
        };
        if opts.regularization > 0.0 {
            let reg = self.l3_regularization(opts.regularization, &mut grads);
            log.regularization = Some(reg);
            log.loss += reg;
        }

        self.apply(optimizer, &grads);
        log
    }

    /// `reg · Σ|x|³` over the rows with gradients, adding its gradient.
    fn l3_regularization(&self, reg: f32, grads: &mut EmbeddingGrads) -> f32 {
        let mut value = 0.0;
        for (&id, g) in grads.entity.iter_mut() {
            value += l3_row(self.entity(id), reg, g);
        }
        for (&id, g) in grads.relation.iter_mut() {
            value += l3_row(self.relation(id), reg, g);
        }
        value
    }
}

fn l3_row(row: ArrayView1<f32>, reg: f32, grad: &mut Array1<f32>) -> f32 {
    grad.zip_mut_with(&row, |g, &x| *g += 3.0 * reg * x * x.abs());
    reg * row.fold(0.0, |sum, x| sum + x.abs().powi(3))
}

fn add_row(rows: &mut HashMap<u32, Array1<f32>>, id: u32, grad: &Array1<f32>) {
    *rows.entry(id).or_insert_with(|| Array1::zeros(grad.len())) += grad;
}
