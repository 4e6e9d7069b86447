//! Scoring families and their analytic gradients.
//!
//! | Family | Score | Entity dim | Relation dim |
//! |---|---|---|---|
//! | TransE | `γ − ‖h + r − t‖₁` | d | d |
//! | DistMult | `Σ h·r·t` | d | d |
//! | ComplEx | `Re⟨h, r, t̄⟩` | 2d | 2d |
//! | RotatE | `γ − Σ \|h∘r − t\|` | 2d | d (phases) |
//!
//! Higher scores mean more plausible triples. Complex-valued embeddings store
//! the real half first, then the imaginary half.

use std::f32::consts::PI;

use ndarray::{Array1, ArrayView1, Axis, Zip};
use serde::{Deserialize, Serialize};

/// Which scoring function a model uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    TransE,
    DistMult,
    ComplEx,
    RotatE,
}

/// Gradient buffers for one `(h, r, t)` score.
#[derive(Debug, Clone, PartialEq)]
pub struct TripleGrads {
    pub head: Array1<f32>,
    pub relation: Array1<f32>,
    pub tail: Array1<f32>,
}

impl TripleGrads {
    pub fn zeros(entity_dim: usize, relation_dim: usize) -> Self {
        Self {
            head: Array1::zeros(entity_dim),
            relation: Array1::zeros(relation_dim),
            tail: Array1::zeros(entity_dim),
        }
    }
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::TransE,
        ModelKind::DistMult,
        ModelKind::ComplEx,
        ModelKind::RotatE,
    ];

    /// Required `(double_entity_embedding, double_relation_embedding)`.
    pub fn required_doubling(self) -> (bool, bool) {
        match self {
            ModelKind::TransE | ModelKind::DistMult => (false, false),
            ModelKind::ComplEx => (true, true),
            ModelKind::RotatE => (true, false),
        }
    }

    /// Plausibility of `(h, r, t)`.
    pub fn score(
        self,
        p: &ScoreParams,
        h: ArrayView1<f32>,
        r: ArrayView1<f32>,
        t: ArrayView1<f32>,
    ) -> f32 {
        match self {
            ModelKind::TransE => {
                let dist = Zip::from(h)
                    .and(r)
                    .and(t)
                    .fold(0.0, |acc, &h, &r, &t| acc + (h + r - t).abs());
                p.gamma - dist
            }
            ModelKind::DistMult => Zip::from(h)
                .and(r)
                .and(t)
                .fold(0.0, |acc, &h, &r, &t| acc + h * r * t),
            ModelKind::ComplEx => complex_products(h, r, t).sum(),
            ModelKind::RotatE => p.gamma - rotate_moduli(p, h, r, t).sum(),
        }
    }

    /// Add `scale · ∂score/∂{h, r, t}` into `grads`.
    pub fn accumulate_grad(
        self,
        p: &ScoreParams,
        h: ArrayView1<f32>,
        r: ArrayView1<f32>,
        t: ArrayView1<f32>,
        scale: f32,
        grads: &mut TripleGrads,
    ) {
        let TripleGrads {
            head: gh,
            relation: gr,
            tail: gt,
        } = grads;
        match self {
            ModelKind::TransE => {
                Zip::from(gh)
                    .and(gr)
                    .and(gt)
                    .and(h)
                    .and(r)
                    .and(t)
                    .for_each(|gh, gr, gt, &h, &r, &t| {
                        let g = -scale * sign(h + r - t);
                        *gh += g;
                        *gr += g;
                        *gt -= g;
                    });
            }
            ModelKind::DistMult => {
                Zip::from(gh)
                    .and(gr)
                    .and(gt)
                    .and(h)
                    .and(r)
                    .and(t)
                    .for_each(|gh, gr, gt, &h, &r, &t| {
                        *gh += scale * r * t;
                        *gr += scale * h * t;
                        *gt += scale * h * r;
                    });
            }
            ModelKind::ComplEx => {
                let d = h.len() / 2;
                for i in 0..d {
                    let (a, b) = (h[i], h[d + i]);
                    let (c, dd) = (r[i], r[d + i]);
                    let (e, f) = (t[i], t[d + i]);
                    gh[i] += scale * (c * e + dd * f);
                    gh[d + i] += scale * (c * f - dd * e);
                    gr[i] += scale * (a * e + b * f);
                    gr[d + i] += scale * (a * f - b * e);
                    gt[i] += scale * (a * c - b * dd);
                    gt[d + i] += scale * (a * dd + b * c);
                }
            }
            ModelKind::RotatE => {
                let d = h.len() / 2;
                let phase_scale = PI / p.embedding_range;
                for i in 0..d {
                    let (re, im, m) = rotate_residual(p, h, r, t, i);
                    if m <= f32::EPSILON {
                        continue;
                    }
                    // ∂score/∂re and ∂score/∂im.
                    let g_re = -scale * re / m;
                    let g_im = -scale * im / m;
                    let (sin, cos) = (r[i] * phase_scale).sin_cos();
                    let (a, b) = (h[i], h[d + i]);
                    gh[i] += g_re * cos + g_im * sin;
                    gh[d + i] += -g_re * sin + g_im * cos;
                    gt[i] -= g_re;
                    gt[d + i] -= g_im;
                    let d_theta = g_re * (-a * sin - b * cos) + g_im * (a * cos - b * sin);
                    gr[i] += d_theta * phase_scale;
                }
            }
        }
    }

    /// Per-dimension combination of `(h, r, t)` fed to the confidence classifier.
    ///
    /// The result has length `hidden_dim` for every family.
    pub fn combine(
        self,
        p: &ScoreParams,
        h: ArrayView1<f32>,
        r: ArrayView1<f32>,
        t: ArrayView1<f32>,
    ) -> Array1<f32> {
        match self {
            ModelKind::TransE => &h + &r - &t,
            ModelKind::DistMult => &h * &r * &t,
            ModelKind::ComplEx => complex_products(h, r, t),
            ModelKind::RotatE => rotate_moduli(p, h, r, t),
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelKind::TransE => write!(f, "TransE"),
            ModelKind::DistMult => write!(f, "DistMult"),
            ModelKind::ComplEx => write!(f, "ComplEx"),
            ModelKind::RotatE => write!(f, "RotatE"),
        }
    }
}

impl std::str::FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelKind::ALL
            .into_iter()
            .find(|kind| kind.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!("unknown model \"{s}\" (expected TransE, DistMult, ComplEx or RotatE)")
            })
    }
}

/// Constants shared by every score evaluation of one model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreParams {
    /// Margin γ.
    pub gamma: f32,
    /// Half-width of the initialisation interval; also sets the RotatE phase scale.
    pub embedding_range: f32,
}

impl ScoreParams {
    /// `embedding_range = (γ + 2) / hidden_dim`.
    pub fn new(gamma: f32, hidden_dim: usize) -> Self {
        Self {
            gamma,
            embedding_range: (gamma + 2.0) / hidden_dim as f32,
        }
    }
}

fn sign(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// `Re(h·r·t̄)` per complex dimension.
fn complex_products(h: ArrayView1<f32>, r: ArrayView1<f32>, t: ArrayView1<f32>) -> Array1<f32> {
    let d = h.len() / 2;
    let (a, b) = h.split_at(Axis(0), d);
    let (c, dd) = r.split_at(Axis(0), d);
    let (e, f) = t.split_at(Axis(0), d);
    Array1::from_shape_fn(d, |i| {
        (a[i] * c[i] - b[i] * dd[i]) * e[i] + (a[i] * dd[i] + b[i] * c[i]) * f[i]
    })
}

/// `|h∘r − t|` per complex dimension.
fn rotate_moduli(
    p: &ScoreParams,
    h: ArrayView1<f32>,
    r: ArrayView1<f32>,
    t: ArrayView1<f32>,
) -> Array1<f32> {
    Array1::from_shape_fn(h.len() / 2, |i| rotate_residual(p, h, r, t, i).2)
}

/// RotatE residual `h∘r − t` at dimension `i`: `(re, im, modulus)`.
fn rotate_residual(
    p: &ScoreParams,
    h: ArrayView1<f32>,
    r: ArrayView1<f32>,
    t: ArrayView1<f32>,
    i: usize,
) -> (f32, f32, f32) {
    let d = h.len() / 2;
    let (sin, cos) = (r[i] * PI / p.embedding_range).sin_cos();
    let re = h[i] * cos - h[d + i] * sin - t[i];
    let im = h[i] * sin + h[d + i] * cos - t[d + i];
    (re, im, (re * re + im * im).sqrt())
}
