//! Scoring model, optimizers and the small feed-forward network.
//!
//! - [`scoring::ModelKind`]: TransE / DistMult / ComplEx / RotatE
//! - [`kge::KgeModel`]: embedding tables and the weighted negative-sampling loss
//! - [`network::SimpleNN`]: one-hidden-layer network for classifier and generator
//! - [`optim`]: Adam and SGD over `ndarray` tensors

pub mod kge;
pub mod network;
pub mod optim;
pub mod scoring;

pub use kge::{KgeModel, LossOptions, ModelShape, StepLog};
pub use scoring::ModelKind;
