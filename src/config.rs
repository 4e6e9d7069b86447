//! Run configuration.
//!
//! [`RunConfig`] carries every option of a run and is persisted as
//! `config.json` next to the checkpoint so a later run can pick the model
//! shape and dataset back up.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::{ModelKind, ModelShape};

/// Name of the persisted configuration inside a checkpoint directory.
pub const CONFIG_FILE: &str = "config.json";

/// Negative-reweighting method layered on top of plain training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    /// Learned confidence classifier with a lightweight generator.
    #[serde(rename = "clf")]
    Clf,
    /// Generator embedding model picking adversarial negatives.
    #[serde(rename = "KBGAN")]
    Kbgan,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Clf => write!(f, "clf"),
            Method::Kbgan => write!(f, "KBGAN"),
        }
    }
}

impl std::str::FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("clf") {
            Ok(Method::Clf)
        } else if s.eq_ignore_ascii_case("kbgan") {
            Ok(Method::Kbgan)
        } else {
            Err(format!("unknown method \"{s}\" (expected clf or KBGAN)"))
        }
    }
}

/// All options of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub do_train: bool,
    pub do_valid: bool,
    pub do_test: bool,
    pub evaluate_train: bool,

    pub data_path: Option<PathBuf>,
    /// Training file name inside `data_path`.
    pub train_set: String,

    pub model: ModelKind,
    pub double_entity_embedding: bool,
    pub double_relation_embedding: bool,
    pub negative_sample_size: usize,
    pub hidden_dim: usize,
    /// Hidden size of the KBGAN generator model.
    pub gen_dim: usize,
    pub gamma: f32,
    pub negative_adversarial_sampling: bool,
    pub adversarial_temperature: f32,
    pub batch_size: usize,
    pub regularization: f32,
    pub test_batch_size: usize,
    pub uni_weight: bool,
    pub frequency_subsampling: bool,

    pub learning_rate: f32,
    pub cpu_num: usize,
    pub init_checkpoint: Option<PathBuf>,
    pub save_path: Option<PathBuf>,
    pub no_save: bool,
    pub max_steps: u64,
    /// Defaults to `max_steps`.
    pub warm_up_steps: Option<u64>,
    pub save_checkpoint_steps: u64,
    pub valid_steps: u64,
    pub log_steps: u64,
    pub test_log_steps: usize,

    pub method: Option<Method>,
    /// Tag of the injected fake-triple file `fake<TAG>.json`.
    pub fake: Option<String>,
    /// Soft/hard repeat count: 1 pins soft, 1000 pins hard, else alternate.
    pub num: u32,
    pub seed: u64,
    pub confidence_smoothing: f32,
    pub confidence_threshold: f32,
    pub refresh_interval: u64,
    pub gan_epochs: usize,
    pub classifier_epochs: usize,
    pub classifier_warmup_epochs: usize,
    pub kbgan_log_steps: u64,

    /// Filled in from the vocabulary at load time.
    pub nentity: usize,
    pub nrelation: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            do_train: false,
            do_valid: false,
            do_test: false,
            evaluate_train: false,
            data_path: None,
            train_set: "train.txt".into(),
            model: ModelKind::TransE,
            double_entity_embedding: false,
            double_relation_embedding: false,
            negative_sample_size: 128,
            hidden_dim: 500,
            gen_dim: 250,
            gamma: 12.0,
            negative_adversarial_sampling: false,
            adversarial_temperature: 1.0,
            batch_size: 1024,
            regularization: 0.0,
            test_batch_size: 4,
            uni_weight: false,
            frequency_subsampling: false,
            learning_rate: 1e-4,
            cpu_num: 10,
            init_checkpoint: None,
            save_path: None,
            no_save: false,
            max_steps: 100_000,
            warm_up_steps: None,
            save_checkpoint_steps: 10_000,
            valid_steps: 10_000,
            log_steps: 100,
            test_log_steps: 1000,
            method: None,
            fake: None,
            num: 1,
            seed: 0,
            confidence_smoothing: 0.5,
            confidence_threshold: 0.5,
            refresh_interval: 10_001,
            gan_epochs: 200,
            classifier_epochs: 200,
            classifier_warmup_epochs: 1200,
            kbgan_log_steps: 300,
            nentity: 0,
            nrelation: 0,
        }
    }
}

impl RunConfig {
    /// Apply the checkpoint override and check everything a run needs.
    ///
    /// Checks run in order: mode flag, data path (after the override), save
    /// path, model compatibility, numeric ranges.
    pub fn resolve(mut self) -> Result<Self, ConfigError> {
        if !(self.do_train || self.do_valid || self.do_test) {
            return Err(ConfigError::NoMode);
        }
        if let Some(dir) = self.init_checkpoint.clone() {
            let saved = Self::load(&dir)?;
            self.override_from(&saved);
        }
        if self.data_path.is_none() {
            return Err(ConfigError::NoDataPath);
        }
        if self.do_train && self.save_path.is_none() {
            return Err(ConfigError::NoSavePath);
        }
        self.model_shape().validate()?;
        self.check_ranges()?;
        Ok(self)
    }

    /// Take model and data settings from a saved configuration.
    ///
    /// `method` and `save_path` are only taken when not training.
    pub fn override_from(&mut self, saved: &RunConfig) {
        if self.data_path.is_none() {
            self.data_path = saved.data_path.clone();
        }
        self.model = saved.model;
        self.double_entity_embedding = saved.double_entity_embedding;
        self.double_relation_embedding = saved.double_relation_embedding;
        self.hidden_dim = saved.hidden_dim;
        self.test_batch_size = saved.test_batch_size;
        self.fake = saved.fake.clone();
        if !self.do_train {
            self.method = saved.method;
            self.save_path = saved.save_path.clone();
        }
    }

    fn check_ranges(&self) -> Result<(), ConfigError> {
        let positive = [
            ("negative_sample_size", self.negative_sample_size),
            ("batch_size", self.batch_size),
            ("test_batch_size", self.test_batch_size),
            ("cpu_num", self.cpu_num),
            ("gen_dim", self.gen_dim),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::InvalidValue {
                field: (*field).into(),
                message: "must be positive".into(),
            });
        }
        for (field, value) in [
            ("confidence_smoothing", self.confidence_smoothing),
            ("confidence_threshold", self.confidence_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    message: format!("{value} is outside [0, 1]"),
                });
            }
        }
        let cadences = [
            self.refresh_interval,
            self.log_steps,
            self.save_checkpoint_steps,
            self.valid_steps,
            self.kbgan_log_steps,
        ];
        if cadences.contains(&0) {
            return Err(ConfigError::InvalidValue {
                field: "step cadence".into(),
                message: "log, save, valid and refresh intervals must be positive".into(),
            });
        }
        Ok(())
    }

    /// Shape of the main model.
    pub fn model_shape(&self) -> ModelShape {
        ModelShape {
            kind: self.model,
            nentity: self.nentity,
            nrelation: self.nrelation,
            hidden_dim: self.hidden_dim,
            gamma: self.gamma,
            double_entity_embedding: self.double_entity_embedding,
            double_relation_embedding: self.double_relation_embedding,
        }
    }

    /// Shape of the KBGAN generator: the main shape at `gen_dim`.
    pub fn generator_shape(&self) -> ModelShape {
        ModelShape {
            hidden_dim: self.gen_dim,
            ..self.model_shape()
        }
    }

    pub fn warm_up_steps(&self) -> u64 {
        self.warm_up_steps.unwrap_or(self.max_steps)
    }

    pub fn adversarial_temperature(&self) -> Option<f32> {
        self.negative_adversarial_sampling
            .then_some(self.adversarial_temperature)
    }

    /// Directory holding the log file: the save path, else the init checkpoint.
    pub fn log_dir(&self) -> Option<&Path> {
        self.save_path.as_deref().or(self.init_checkpoint.as_deref())
    }

    /// `train.log` when training, `test.log` otherwise.
    pub fn log_file(&self) -> Option<PathBuf> {
        let name = if self.do_train { "train.log" } else { "test.log" };
        self.log_dir().map(|dir| dir.join(name))
    }

    /// Read `config.json` from a checkpoint directory.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(CONFIG_FILE);
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Malformed {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn train_config() -> RunConfig {
        RunConfig {
            do_train: true,
            data_path: Some("data/FB15k".into()),
            save_path: Some("models/run".into()),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let c = RunConfig::default();
        assert_eq!(c.negative_sample_size, 128);
        assert_eq!(c.hidden_dim, 500);
        assert_eq!(c.batch_size, 1024);
        assert_eq!(c.max_steps, 100_000);
        assert_eq!(c.warm_up_steps(), 100_000);
        assert_eq!(c.refresh_interval, 10_001);
        assert_eq!(c.num, 1);
    }

    #[test]
    fn missing_mode_is_reported_first() {
        let err = RunConfig::default().resolve().unwrap_err();
        assert!(matches!(err, ConfigError::NoMode));
    }

    #[test]
    fn missing_data_path_is_reported() {
        let c = RunConfig {
            do_valid: true,
            ..Default::default()
        };
        assert!(matches!(c.resolve(), Err(ConfigError::NoDataPath)));
    }

    #[test]
    fn training_needs_save_path() {
        let c = RunConfig {
            save_path: None,
            ..train_config()
        };
        assert!(matches!(c.resolve(), Err(ConfigError::NoSavePath)));
    }

    #[test]
    fn rotate_without_doubling_is_rejected() {
        let c = RunConfig {
            model: ModelKind::RotatE,
            ..train_config()
        };
        assert!(matches!(c.resolve(), Err(ConfigError::IncompatibleModel { .. })));
        let ok = RunConfig {
            model: ModelKind::RotatE,
            double_entity_embedding: true,
            ..train_config()
        };
        assert!(ok.resolve().is_ok());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let c = RunConfig {
            batch_size: 0,
            ..train_config()
        };
        assert!(matches!(c.resolve(), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn checkpoint_overrides_model_settings() {
        let dir = TempDir::new().unwrap();
        let saved = RunConfig {
            model: ModelKind::ComplEx,
            double_entity_embedding: true,
            double_relation_embedding: true,
            hidden_dim: 64,
            fake: Some("10".into()),
            method: Some(Method::Clf),
            ..train_config()
        };
        let json = serde_json::to_string(&saved).unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), json).unwrap();

        let eval = RunConfig {
            do_test: true,
            init_checkpoint: Some(dir.path().to_path_buf()),
            ..Default::default()
        }
        .resolve()
        .unwrap();
        assert_eq!(eval.model, ModelKind::ComplEx);
        assert_eq!(eval.hidden_dim, 64);
        assert_eq!(eval.data_path, saved.data_path);
        assert_eq!(eval.fake.as_deref(), Some("10"));
        assert_eq!(eval.method, Some(Method::Clf));
        assert_eq!(eval.save_path, saved.save_path);
    }

    #[test]
    fn training_keeps_its_own_method_and_save_path() {
        let mut c = RunConfig {
            save_path: Some("new".into()),
            ..train_config()
        };
        let saved = RunConfig {
            method: Some(Method::Kbgan),
            save_path: Some("old".into()),
            ..train_config()
        };
        c.override_from(&saved);
        assert_eq!(c.method, None);
        assert_eq!(c.save_path, Some(PathBuf::from("new")));
    }

    #[test]
    fn method_names_round_trip() {
        assert_eq!("clf".parse::<Method>().unwrap(), Method::Clf);
        assert_eq!("KBGAN".parse::<Method>().unwrap(), Method::Kbgan);
        assert_eq!(serde_json::to_string(&Method::Kbgan).unwrap(), "\"KBGAN\"");
        assert!("gan".parse::<Method>().is_err());
    }

    #[test]
    fn log_file_depends_on_mode() {
        let c = train_config();
        assert_eq!(c.log_file(), Some(PathBuf::from("models/run/train.log")));
        let t = RunConfig {
            do_train: false,
            do_test: true,
            ..train_config()
        };
        assert_eq!(t.log_file(), Some(PathBuf::from("models/run/test.log")));
    }
}
