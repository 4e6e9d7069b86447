//! First-order optimizers over `ndarray` tensors.
//!
//! [`Adam`] supports dense steps (network layers) and row-sparse steps
//! (embedding tables, where only rows touched by the batch are updated).
//! [`Sgd`] is plain gradient descent.

use std::collections::HashMap;

use ndarray::{Array, Array1, Array2, Dimension, Ix2, Zip};
use serde::{Deserialize, Serialize};

use super::kge::KgeModel;

/// Adam (Kingma & Ba, 2015) with bias correction, moments shaped like the
/// parameter tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adam<D: Dimension> {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    /// First moment estimates.
    m: Array<f32, D>,
    /// Second moment estimates.
    v: Array<f32, D>,
    /// Steps taken.
    t: u64,
}

/// Per-step constants of one Adam update.
#[derive(Debug, Clone, Copy)]
struct AdamRule {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    c1: f32,
    c2: f32,
}

impl AdamRule {
    #[inline]
    fn update(&self, p: &mut f32, m: &mut f32, v: &mut f32, g: f32) {
        *m = self.beta1 * *m + (1.0 - self.beta1) * g;
        *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
        let m_hat = *m / self.c1;
        let v_hat = *v / self.c2;
        *p -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
    }
}

impl<D: Dimension> Adam<D> {
    /// Adam with default betas for a tensor of shape `dim`.
    pub fn new(learning_rate: f32, dim: D) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            m: Array::zeros(dim.clone()),
            v: Array::zeros(dim),
            t: 0,
        }
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    pub fn steps(&self) -> u64 {
        self.t
    }

    /// Update every parameter.
    pub fn step(&mut self, params: &mut Array<f32, D>, grads: &Array<f32, D>) {
        let rule = self.advance();
        Zip::from(params)
            .and(&mut self.m)
            .and(&mut self.v)
            .and(grads)
            .for_each(|p, m, v, &g| rule.update(p, m, v, g));
    }

    fn advance(&mut self) -> AdamRule {
        self.t += 1;
        let t = self.t as i32;
        AdamRule {
            learning_rate: self.learning_rate,
            beta1: self.beta1,
            beta2: self.beta2,
            epsilon: self.epsilon,
            c1: 1.0 - self.beta1.powi(t),
            c2: 1.0 - self.beta2.powi(t),
        }
    }
}

impl Adam<Ix2> {
    /// Update only the rows present in `rows` (lazy Adam).
    ///
    /// Moments of untouched rows are left as they are.
    pub fn step_rows(&mut self, params: &mut Array2<f32>, rows: &HashMap<u32, Array1<f32>>) {
        let rule = self.advance();
        for (&row, grad) in rows {
            let r = row as usize;
            Zip::from(params.row_mut(r))
                .and(self.m.row_mut(r))
                .and(self.v.row_mut(r))
                .and(grad)
                .for_each(|p, m, v, &g| rule.update(p, m, v, g));
        }
    }
}

/// Stochastic gradient descent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sgd {
    learning_rate: f32,
}

impl Sgd {
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }

    pub fn step<D: Dimension>(&self, params: &mut Array<f32, D>, grads: &Array<f32, D>) {
        params.scaled_add(-self.learning_rate, grads);
    }
}

/// Adam pair for a model's entity and relation tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingOptimizer {
    pub entity: Adam<Ix2>,
    pub relation: Adam<Ix2>,
}

impl EmbeddingOptimizer {
    /// Fresh state shaped like `model`'s tables.
    pub fn new(learning_rate: f32, model: &KgeModel) -> Self {
        Self {
            entity: Adam::new(learning_rate, model.entity_embedding().raw_dim()),
            relation: Adam::new(learning_rate, model.relation_embedding().raw_dim()),
        }
    }

    pub fn learning_rate(&self) -> f32 {
        self.entity.learning_rate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn adam_minimises_a_quadratic() {
        // f(x) = (x - 3)^2
        let mut x = array![0.0f32];
        let mut adam = Adam::new(0.1, x.raw_dim());
        for _ in 0..500 {
            let g = x.mapv(|v| 2.0 * (v - 3.0));
            adam.step(&mut x, &g);
        }
        assert!((x[0] - 3.0).abs() < 0.05, "x = {}", x[0]);
    }

    #[test]
    fn first_adam_step_moves_by_learning_rate() {
        let mut x = array![1.0f32, 1.0];
        let mut adam = Adam::new(0.01, x.raw_dim());
        adam.step(&mut x, &array![5.0, -0.1]);
        // Bias-corrected first step is lr * sign(g).
        assert!((x[0] - 0.99).abs() < 1e-5);
        assert!((x[1] - 1.01).abs() < 1e-5);
        assert_eq!(adam.steps(), 1);
    }

    #[test]
    fn sparse_step_leaves_other_rows_alone() {
        let mut table = Array2::from_elem((3, 2), 1.0f32);
        let mut adam = Adam::new(0.1, table.raw_dim());
        let rows = HashMap::from([(1u32, array![1.0, 1.0])]);
        adam.step_rows(&mut table, &rows);
        assert_eq!(table.row(0), array![1.0f32, 1.0]);
        assert!(table.row(1).iter().all(|&x| x < 1.0));
        assert_eq!(table.row(2), array![1.0f32, 1.0]);
    }

    #[test]
    fn sgd_steps_against_gradient() {
        let mut x = array![1.0f32, -1.0];
        Sgd::new(0.5).step(&mut x, &array![2.0, -2.0]);
        assert_eq!(x, array![0.0f32, 0.0]);
    }
}
