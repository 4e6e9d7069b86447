//! Small feed-forward network: `input → tanh(hidden) → 1`.
//!
//! Used both as the confidence classifier and as the lightweight generator.

use ndarray::{Array1, Array2, Axis, Ix1, Ix2};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::optim::{Adam, Sgd};

/// Hidden width used by the classifier and generator.
pub const DEFAULT_HIDDEN: usize = 5;

/// Parameter tensors of [`SimpleNN`]. Also used for their gradients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layers {
    /// `hidden × input`.
    pub hidden_weight: Array2<f32>,
    pub hidden_bias: Array1<f32>,
    pub output_weight: Array1<f32>,
    /// Single scalar, kept as a length-1 tensor.
    pub output_bias: Array1<f32>,
}

impl Layers {
    pub fn zeros(input_dim: usize, hidden_dim: usize) -> Self {
        Self {
            hidden_weight: Array2::zeros((hidden_dim, input_dim)),
            hidden_bias: Array1::zeros(hidden_dim),
            output_weight: Array1::zeros(hidden_dim),
            output_bias: Array1::zeros(1),
        }
    }
}

/// One-hidden-layer network with a scalar logit output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleNN {
    layers: Layers,
}

/// Intermediate values kept from a forward pass for backpropagation.
#[derive(Debug, Clone)]
pub struct Activations {
    pub hidden: Array1<f32>,
    pub logit: f32,
}

impl Activations {
    /// `σ(logit)`.
    pub fn confidence(&self) -> f32 {
        sigmoid(self.logit)
    }
}

impl SimpleNN {
    /// Uniform `±1/sqrt(fan_in)` initialisation per layer.
    pub fn new(input_dim: usize, hidden_dim: usize, rng: &mut impl Rng) -> Self {
        let bound1 = 1.0 / (input_dim as f32).sqrt();
        let bound2 = 1.0 / (hidden_dim as f32).sqrt();
        let mut uniform1 = || rng.gen_range(-bound1..bound1);
        let hidden_weight = Array2::from_shape_simple_fn((hidden_dim, input_dim), &mut uniform1);
        let hidden_bias = Array1::from_shape_simple_fn(hidden_dim, &mut uniform1);
        let mut uniform2 = || rng.gen_range(-bound2..bound2);
        let output_weight = Array1::from_shape_simple_fn(hidden_dim, &mut uniform2);
        let output_bias = Array1::from_shape_simple_fn(1, &mut uniform2);
        Self {
            layers: Layers {
                hidden_weight,
                hidden_bias,
                output_weight,
                output_bias,
            },
        }
    }

    pub fn input_dim(&self) -> usize {
        self.layers.hidden_weight.ncols()
    }

    pub fn hidden_dim(&self) -> usize {
        self.layers.hidden_weight.nrows()
    }

    pub fn layers(&self) -> &Layers {
        &self.layers
    }

    /// Zeroed gradient buffers shaped like the parameters.
    pub fn zero_grads(&self) -> Layers {
        Layers::zeros(self.input_dim(), self.hidden_dim())
    }

    /// Named parameter blocks and their shapes.
    pub fn parameter_shapes(&self) -> Vec<(&'static str, Vec<usize>)> {
        vec![
            ("hidden.weight", self.layers.hidden_weight.shape().to_vec()),
            ("hidden.bias", self.layers.hidden_bias.shape().to_vec()),
            ("output.weight", vec![1, self.hidden_dim()]),
            ("output.bias", self.layers.output_bias.shape().to_vec()),
        ]
    }

    pub fn forward(&self, x: &Array1<f32>) -> Activations {
        debug_assert_eq!(x.len(), self.input_dim());
        let l = &self.layers;
        let hidden = (l.hidden_weight.dot(x) + &l.hidden_bias).mapv(f32::tanh);
        let logit = l.output_weight.dot(&hidden) + l.output_bias[0];
        Activations { hidden, logit }
    }

    pub fn logit(&self, x: &Array1<f32>) -> f32 {
        self.forward(x).logit
    }

    /// `σ(logit)` in (0, 1).
    pub fn confidence(&self, x: &Array1<f32>) -> f32 {
        sigmoid(self.logit(x))
    }

    /// Accumulate `d_logit · ∂logit/∂params` into `grads`.
    pub fn backward(&self, x: &Array1<f32>, act: &Activations, d_logit: f32, grads: &mut Layers) {
        grads.output_bias[0] += d_logit;
        grads.output_weight.scaled_add(d_logit, &act.hidden);
        let dz = &self.layers.output_weight * &act.hidden.mapv(|a| 1.0 - a * a) * d_logit;
        grads.hidden_bias += &dz;
        let outer = dz
            .view()
            .insert_axis(Axis(1))
            .dot(&x.view().insert_axis(Axis(0)));
        grads.hidden_weight += &outer;
    }

    pub fn step_sgd(&mut self, sgd: &Sgd, grads: &Layers) {
        let l = &mut self.layers;
        sgd.step(&mut l.hidden_weight, &grads.hidden_weight);
        sgd.step(&mut l.hidden_bias, &grads.hidden_bias);
        sgd.step(&mut l.output_weight, &grads.output_weight);
        sgd.step(&mut l.output_bias, &grads.output_bias);
    }

    pub fn step_adam(&mut self, adam: &mut NetworkAdam, grads: &Layers) {
        let l = &mut self.layers;
        adam.hidden_weight.step(&mut l.hidden_weight, &grads.hidden_weight);
        adam.hidden_bias.step(&mut l.hidden_bias, &grads.hidden_bias);
        adam.output_weight.step(&mut l.output_weight, &grads.output_weight);
        adam.output_bias.step(&mut l.output_bias, &grads.output_bias);
    }
}

/// Adam state for every tensor of a [`SimpleNN`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkAdam {
    hidden_weight: Adam<Ix2>,
    hidden_bias: Adam<Ix1>,
    output_weight: Adam<Ix1>,
    output_bias: Adam<Ix1>,
}

impl NetworkAdam {
    pub fn new(learning_rate: f32, network: &SimpleNN) -> Self {
        let l = &network.layers;
        Self {
            hidden_weight: Adam::new(learning_rate, l.hidden_weight.raw_dim()),
            hidden_bias: Adam::new(learning_rate, l.hidden_bias.raw_dim()),
            output_weight: Adam::new(learning_rate, l.output_weight.raw_dim()),
            output_bias: Adam::new(learning_rate, l.output_bias.raw_dim()),
        }
    }

    pub fn learning_rate(&self) -> f32 {
        self.hidden_weight.learning_rate()
    }
}

pub fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// `log σ(x)`, stable for large `|x|`.
pub fn log_sigmoid(x: f32) -> f32 {
    x.min(0.0) - (-x.abs()).exp().ln_1p()
}

/// Binary cross-entropy against a soft target `y ∈ [0, 1]`.
///
/// Returns `(loss, ∂loss/∂logit)`.
pub fn bce_with_logit(logit: f32, y: f32) -> (f32, f32) {
    let loss = -(y * log_sigmoid(logit) + (1.0 - y) * log_sigmoid(-logit));
    (loss, sigmoid(logit) - y)
}
