//! Engine facade: assembles a run from a [`RunConfig`].
//!
//! The `Engine` owns the dataset, the shared weight table, the main model and
//! its optimizer, the batch iterators and, depending on the method, the
//! confidence classifier and a generator. Training is driven by
//! [`crate::train::Trainer`]; evaluation and the detection report live here.

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::ThreadPool;

use crate::checkpoint::{Checkpoint, CheckpointRef};
use crate::config::{Method, RunConfig};
use crate::confidence::generator::{AnyGenerator, EmbeddingGenerator, NetworkGenerator};
use crate::confidence::mode::ConfidenceMode;
use crate::confidence::{ConfidenceClassifier, GENERATOR_LEARNING_RATE};
use crate::error::{ConfigError, KgeResult, TrainError};
use crate::eval::detection::DetectionReport;
use crate::eval::{Evaluator, RankMetrics};
use crate::graph::index::TrueTripleIndex;
use crate::graph::{CorruptionMode, Triple};
use crate::logging::log_metrics;
use crate::model::network::{DEFAULT_HIDDEN, SimpleNN, sigmoid};
use crate::model::optim::EmbeddingOptimizer;
use crate::model::{KgeModel, LossOptions};
use crate::sampler::dataset::TrainDataset;
use crate::sampler::iterator::{BatchStream, BidirectionalIterator};
use crate::sampler::weights::WeightTable;
use crate::sampler::worker_pool;
use crate::store::TripleStore;

/// A ranked split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Valid,
    Test,
    Train,
}

impl Split {
    fn dataset_name(self) -> &'static str {
        match self {
            Split::Valid => "Valid",
            Split::Test => "Test",
            Split::Train => "Training",
        }
    }

    /// Mode name in metric lines. Training-set ranks are reported as `Test`.
    pub fn log_mode(self) -> &'static str {
        match self {
            Split::Valid => "Valid",
            Split::Test | Split::Train => "Test",
        }
    }
}

/// Components that only exist with `--method clf`.
pub struct ClfParts {
    pub classifier: ConfidenceClassifier,
    /// Random tenth of the training triples.
    pub pool: Arc<Vec<Triple>>,
    /// Batches over `pool` for classifier steps.
    pub clf_iter: BidirectionalIterator,
    /// Batches over `pool` for GAN steps.
    pub gen_iter: BidirectionalIterator,
}

/// A fully assembled run.
pub struct Engine {
    pub(crate) config: RunConfig,
    pub(crate) store: TripleStore,
    pub(crate) index: Arc<TrueTripleIndex>,
    pub(crate) weights: WeightTable,
    pub(crate) model: KgeModel,
    pub(crate) optimizer: EmbeddingOptimizer,
    pub(crate) train_iter: BidirectionalIterator,
    pub(crate) clf: Option<ClfParts>,
    pub(crate) generator: Option<AnyGenerator>,
    pub(crate) warm_up_steps: u64,
    pub(crate) current_learning_rate: f32,
    pub(crate) rng: StdRng,
    /// Last completed training step; 0 before training.
    pub(crate) step: u64,
}

impl Engine {
    /// Load the dataset, build every component and restore the init checkpoint.
    ///
    /// `config` must already be resolved ([`RunConfig::resolve`]).
    pub fn new(mut config: RunConfig) -> KgeResult<Self> {
        let data_path = config.data_path.clone().ok_or(ConfigError::NoDataPath)?;
        let store = TripleStore::load(&data_path, &config.train_set, config.fake.as_deref())?;
        config.nentity = store.nentity();
        config.nrelation = store.nrelation();

        tracing::info!("Model: {}", config.model);
        tracing::info!("Data Path: {}", data_path.display());
        tracing::info!("#entity: {}", config.nentity);
        tracing::info!("#relation: {}", config.nrelation);

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut model = KgeModel::new(config.model_shape(), &mut rng)?;

        tracing::info!("Model Parameter Configuration:");
        for (name, shape) in model.parameter_shapes() {
            tracing::info!("Parameter {name}: {shape:?}");
        }

        let index = Arc::new(store.true_index());
        let weights = if config.frequency_subsampling {
            WeightTable::frequency(&store.train)
        } else {
            WeightTable::uniform(&store.train)
        };
        let pool = worker_pool(config.cpu_num)?;
        let train = Arc::new(store.train.clone());
        let train_iter = bidirectional(&config, &train, &index, &weights, &pool, config.seed)?;

        let mut clf = None;
        let mut generator = None;
        match config.method {
            Some(Method::Clf) => {
                let wanted = (train.len() / 10).max(1);
                let sample: Vec<Triple> =
                    train.choose_multiple(&mut rng, wanted).copied().collect();
                let sample = Arc::new(sample);
                let seeded = |salt: u64| {
                    bidirectional(&config, &sample, &index, &weights, &pool, config.seed ^ salt)
                };
                let clf_iter = seeded(0xC1F)?;
                let gen_iter = seeded(0x6E4)?;
                let classifier = ConfidenceClassifier::new(
                    model.feature_dim(),
                    config.confidence_smoothing,
                    config.confidence_threshold,
                    &mut rng,
                );
                let network = SimpleNN::new(model.feature_dim(), DEFAULT_HIDDEN, &mut rng);
                let lightweight = NetworkGenerator::new(network, GENERATOR_LEARNING_RATE);
                generator = Some(AnyGenerator::Network(lightweight));
                tracing::info!(
                    pool = sample.len(),
                    "classifier pool sampled from training triples"
                );
                clf = Some(ClfParts {
                    classifier,
                    pool: sample,
                    clf_iter,
                    gen_iter,
                });
            }
            Some(Method::Kbgan) => {
                let gen_model = KgeModel::new(config.generator_shape(), &mut rng)?;
                generator = Some(AnyGenerator::Embedding(EmbeddingGenerator::new(
                    gen_model,
                    config.learning_rate,
                )));
            }
            None => {}
        }
        if let Some(generator) = &generator {
            for (name, shape) in generator.parameter_shapes() {
                tracing::info!("Generator parameter {name}: {shape:?}");
            }
        }

        let mut warm_up_steps = config.warm_up_steps();
        if let Some(dir) = &config.init_checkpoint {
            tracing::info!("Loading checkpoint {}...", dir.display());
            let checkpoint = Checkpoint::load(dir)?;
            checkpoint.model.check_compatible(model.shape())?;
            model = checkpoint.model;
            if config.do_train {
                warm_up_steps = checkpoint.warm_up_steps;
                tracing::info!("warm_up_steps = {warm_up_steps}");
            }
            if let Some(entries) = &checkpoint.confidence {
                weights.restore(entries);
            }
            if let (Some(parts), Some(saved)) = (clf.as_mut(), checkpoint.classifier) {
                parts.classifier = saved;
            }
            if let (Some(current), Some(saved)) = (generator.as_mut(), checkpoint.generator) {
                if std::mem::discriminant(current) == std::mem::discriminant(&saved) {
                    *current = saved;
                }
            }
        } else {
            tracing::info!("Randomly Initializing {} Model...", config.model);
        }

        let optimizer = EmbeddingOptimizer::new(config.learning_rate, &model);

        Ok(Self {
            current_learning_rate: config.learning_rate,
            config,
            store,
            index,
            weights,
            model,
            optimizer,
            train_iter,
            clf,
            generator,
            warm_up_steps,
            rng,
            step: 0,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn store(&self) -> &TripleStore {
        &self.store
    }

    pub fn model(&self) -> &KgeModel {
        &self.model
    }

    pub fn weights(&self) -> &WeightTable {
        &self.weights
    }

    pub fn train_iter(&self) -> &BidirectionalIterator {
        &self.train_iter
    }

    pub fn clf(&self) -> Option<&ClfParts> {
        self.clf.as_ref()
    }

    pub fn warm_up_steps(&self) -> u64 {
        self.warm_up_steps
    }

    pub fn current_learning_rate(&self) -> f32 {
        self.current_learning_rate
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub(crate) fn loss_options(&self) -> LossOptions {
        LossOptions {
            adversarial_temperature: self.config.adversarial_temperature(),
            uni_weight: self.config.uni_weight,
            regularization: self.config.regularization,
        }
    }

    /// Filtered ranking of `triples` against train, valid and test.
    pub fn evaluate(&self, triples: &[Triple]) -> RankMetrics {
        Evaluator::new(
            Arc::clone(&self.index),
            self.config.test_batch_size,
            self.config.test_log_steps,
        )
        .evaluate(&self.model, triples)
    }

    /// Real-vs-fake detection over the training split.
    ///
    /// With `--method` the weight table is refreshed softly first and used as
    /// the confidence; otherwise `σ(score)` of the main model is.
    pub fn detection_report(&self) -> DetectionReport {
        let threshold = self.config.confidence_threshold;
        if let Some(parts) = &self.clf {
            parts.classifier.find_topk_triples(
                &self.model,
                &[&self.store.train[..], &parts.pool[..]],
                &self.weights,
                ConfidenceMode::Soft,
            );
        }
        if self.config.method.is_some() {
            let weights = &self.weights;
            DetectionReport::build(&self.store.train, &self.store.fakes, threshold, |t| {
                weights.get(t)
            })
        } else {
            tracing::info!("start to use sigmoid to translate distance to probability");
            let model = &self.model;
            DetectionReport::build(&self.store.train, &self.store.fakes, threshold, |t| {
                sigmoid(model.score(t))
            })
        }
    }

    /// Write the checkpoint for the current state unless saving is disabled.
    pub fn save_checkpoint(&self) -> KgeResult<()> {
        if self.config.no_save {
            return Ok(());
        }
        let Some(dir) = self.config.save_path.as_deref() else {
            return Ok(());
        };
        CheckpointRef {
            step: self.step,
            current_learning_rate: self.current_learning_rate,
            warm_up_steps: self.warm_up_steps,
            model: &self.model,
            optimizer: &self.optimizer,
            classifier: self.clf.as_ref().map(|p| &p.classifier),
            generator: self.generator.as_ref(),
            confidence: self.config.method.map(|_| self.weights.snapshot()),
        }
        .save(dir, &self.config)?;
        Ok(())
    }

    /// Everything the flags ask for: train, then valid, test and train-set ranking.
    pub fn run(&mut self) -> KgeResult<()> {
        if self.config.do_train {
            crate::train::Trainer::new(self).run()?;
        }
        let step = self.step;

        if self.config.do_valid {
            self.evaluate_split(Split::Valid, step);
        }

        if self.config.do_test {
            self.evaluate_split(Split::Test, step);

            if !self.store.fakes.is_empty() {
                let report = self.detection_report();
                tracing::info!(
                    real = report.real_count,
                    fake = report.fake_count,
                    "detection with real triples as the positive class"
                );
                log_metrics("Detection(real)", step, &report.real.entries());
                log_metrics("Detection(fake)", step, &report.fake.entries());
            }
        }

        if self.config.evaluate_train {
            self.evaluate_split(Split::Train, step);
        }
        Ok(())
    }

    /// Rank one split and log its metrics.
    pub fn evaluate_split(&self, split: Split, step: u64) -> RankMetrics {
        tracing::info!("Evaluating on {} Dataset...", split.dataset_name());
        let triples = match split {
            Split::Valid => &self.store.valid,
            Split::Test => &self.store.test,
            Split::Train => &self.store.train,
        };
        let metrics = self.evaluate(triples);
        log_metrics(split.log_mode(), step, &metrics.entries());
        metrics
    }

    /// One-line summary of the assembled run.
    pub fn info(&self) -> String {
        format!(
            "{} d={} on {} entities / {} relations, {} train ({} fake), method {}",
            self.config.model,
            self.config.hidden_dim,
            self.config.nentity,
            self.config.nrelation,
            self.store.train.len(),
            self.store.fakes.len(),
            self.config.method.map_or("none".to_string(), |m| m.to_string()),
        )
    }
}

/// Head- and tail-corruption streams over `triples` sharing `weights`.
fn bidirectional(
    config: &RunConfig,
    triples: &Arc<Vec<Triple>>,
    index: &Arc<TrueTripleIndex>,
    weights: &WeightTable,
    pool: &Arc<ThreadPool>,
    seed: u64,
) -> Result<BidirectionalIterator, TrainError> {
    let stream = |mode: CorruptionMode, seed: u64| {
        let dataset = TrainDataset::new(
            Arc::clone(triples),
            config.nentity,
            config.negative_sample_size,
            mode,
            Arc::clone(index),
            weights.clone(),
        );
        BatchStream::new(Arc::new(dataset), config.batch_size, seed, Arc::clone(pool))
    };
    Ok(BidirectionalIterator::new(
        stream(CorruptionMode::HeadBatch, seed)?,
        stream(CorruptionMode::TailBatch, seed.wrapping_add(1))?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn train_ranks_share_the_test_mode_name() {
        assert_eq!(Split::Valid.log_mode(), "Valid");
        assert_eq!(Split::Test.log_mode(), "Test");
        assert_eq!(Split::Train.log_mode(), "Test");
        assert_eq!(Split::Train.dataset_name(), "Training");
    }
}
