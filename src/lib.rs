// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # kge-denoise
//!
//! Knowledge-graph embedding training with negative sampling, self-adversarial
//! weighting and confidence reweighting of noisy training triples.
//!
//! ## Architecture
//!
//! - **Dataset** (`symbol`, `graph`, `store`): dictionaries, id triples, the
//!   filtered true-triple index and injected fakes
//! - **Sampling** (`sampler`): per-direction negative sampling, batch streams
//!   and the shared subsampling weight table
//! - **Models** (`model`): TransE / DistMult / ComplEx / RotatE with hand-derived
//!   gradients, Adam and SGD
//! - **Confidence** (`confidence`): the clf classifier, its generators and the
//!   soft/hard weight refresh
//! - **Training** (`train`): step loop, warm-up, refresh cadence, KBGAN steps
//! - **Evaluation** (`eval`): filtered MRR / MR / Hits@K and fake detection
//!
//! ## Library usage
//!
//! ```no_run
//! use kge_denoise::config::RunConfig;
//! use kge_denoise::engine::Engine;
//!
//! let config = RunConfig {
//!     do_valid: true,
//!     data_path: Some("data/FB15k".into()),
//!     ..RunConfig::default()
//! }
//! .resolve()
//! .unwrap();
//! let engine = Engine::new(config).unwrap();
//! let metrics = engine.evaluate(&engine.store().valid);
//! println!("{}", metrics.summary());
//! ```

pub mod checkpoint;
pub mod confidence;
pub mod config;
pub mod engine;
pub mod error;
pub mod eval;
pub mod graph;
pub mod logging;
pub mod model;
pub mod sampler;
pub mod store;
pub mod symbol;
pub mod train;
