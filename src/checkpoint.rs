//! Checkpoint persistence.
//!
//! A checkpoint directory holds `config.json` (the [`RunConfig`] as JSON) and
//! `checkpoint` (a bincode bundle of model, optimizer, optional classifier and
//! generator, counters and the confidence table).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{CONFIG_FILE, RunConfig};
use crate::confidence::ConfidenceClassifier;
use crate::confidence::generator::AnyGenerator;
use crate::error::CheckpointError;
use crate::graph::Triple;
use crate::model::KgeModel;
use crate::model::optim::EmbeddingOptimizer;

/// Name of the binary bundle inside a checkpoint directory.
pub const CHECKPOINT_FILE: &str = "checkpoint";

/// Everything restored from a checkpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Checkpoint {
    pub step: u64,
    pub current_learning_rate: f32,
    pub warm_up_steps: u64,
    pub model: KgeModel,
    pub optimizer: EmbeddingOptimizer,
    pub classifier: Option<ConfidenceClassifier>,
    pub generator: Option<AnyGenerator>,
    /// Weight-table entries, sorted by triple.
    pub confidence: Option<Vec<(Triple, f32)>>,
}

/// Borrowed view with the same layout as [`Checkpoint`], written without cloning.
#[derive(Debug, Serialize)]
pub struct CheckpointRef<'a> {
    pub step: u64,
    pub current_learning_rate: f32,
    pub warm_up_steps: u64,
    pub model: &'a KgeModel,
    pub optimizer: &'a EmbeddingOptimizer,
    pub classifier: Option<&'a ConfidenceClassifier>,
    pub generator: Option<&'a AnyGenerator>,
    pub confidence: Option<Vec<(Triple, f32)>>,
}

impl CheckpointRef<'_> {
    /// Write `config.json` and `checkpoint` into `dir`, creating it if needed.
    pub fn save(&self, dir: &Path, config: &RunConfig) -> Result<(), CheckpointError> {
        std::fs::create_dir_all(dir).map_err(|source| CheckpointError::Io {
            path: dir.display().to_string(),
            source,
        })?;

        let json = serde_json::to_string_pretty(config).map_err(|e| CheckpointError::Serialization {
            message: e.to_string(),
        })?;
        write_file(&dir.join(CONFIG_FILE), json.as_bytes())?;

        let bytes = bincode::serialize(self).map_err(|e| CheckpointError::Serialization {
            message: e.to_string(),
        })?;
        write_file(&dir.join(CHECKPOINT_FILE), &bytes)?;

        tracing::debug!(
            dir = %dir.display(),
            step = self.step,
            bytes = bytes.len(),
            "saved checkpoint"
        );
        Ok(())
    }
}

impl Checkpoint {
    /// Read the `checkpoint` bundle from `dir`.
    pub fn load(dir: &Path) -> Result<Self, CheckpointError> {
        let path = dir.join(CHECKPOINT_FILE);
        let bytes = std::fs::read(&path).map_err(|source| CheckpointError::Io {
            path: path.display().to_string(),
            source,
        })?;
        bincode::deserialize(&bytes).map_err(|e| CheckpointError::Serialization {
            message: format!("{}: {e}", path.display()),
        })
    }
}

/// Write to `<path>.tmp`, then rename into place.
fn write_file(path: &Path, bytes: &[u8]) -> Result<(), CheckpointError> {
    let tmp = path.with_extension("tmp");
    let io_err = |source| CheckpointError::Io {
        path: path.display().to_string(),
        source,
    };
    std::fs::write(&tmp, bytes).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)
}
