//! kge: train and evaluate knowledge-graph embeddings.

use std::io::BufReader;
use std::path::PathBuf;

use clap::Parser;
use miette::{IntoDiagnostic, Result};

use kge_denoise::config::{Method, RunConfig};
use kge_denoise::engine::Engine;
use kge_denoise::logging::{self, Overwrite};
use kge_denoise::model::ModelKind;

#[derive(Parser)]
#[command(
    name = "kge",
    version,
    about = "Knowledge graph embedding training with confidence-reweighted negatives"
)]
struct Cli {
    /// Train the model.
    #[arg(long)]
    do_train: bool,

    /// Evaluate on the validation split.
    #[arg(long)]
    do_valid: bool,

    /// Evaluate on the test split (and report fake detection).
    #[arg(long)]
    do_test: bool,

    /// Rank the training triples after training.
    #[arg(long)]
    evaluate_train: bool,

    /// Dataset directory with entities.dict, relations.dict and the splits.
    #[arg(long)]
    data_path: Option<PathBuf>,

    /// Training file inside the dataset directory.
    #[arg(long, default_value = "train.txt")]
    train_set: String,

    /// Scoring family: TransE, DistMult, ComplEx or RotatE.
    #[arg(short, long, default_value = "TransE")]
    model: ModelKind,

    #[arg(long = "double-entity-embedding", visible_alias = "de")]
    double_entity_embedding: bool,

    #[arg(long = "double-relation-embedding", visible_alias = "dr")]
    double_relation_embedding: bool,

    /// Negatives per positive.
    #[arg(short = 'n', long, default_value_t = 128)]
    negative_sample_size: usize,

    #[arg(short = 'd', long, default_value_t = 500)]
    hidden_dim: usize,

    /// Hidden size of the KBGAN generator model.
    #[arg(long, default_value_t = 250)]
    gen_dim: usize,

    #[arg(short, long, default_value_t = 12.0)]
    gamma: f32,

    /// Weight negatives by a softmax of their scores.
    #[arg(long = "negative-adversarial-sampling", visible_alias = "adv")]
    negative_adversarial_sampling: bool,

    #[arg(short, long, default_value_t = 1.0)]
    adversarial_temperature: f32,

    #[arg(short, long, default_value_t = 1024)]
    batch_size: usize,

    /// L3 regularization strength.
    #[arg(short, long, default_value_t = 0.0)]
    regularization: f32,

    /// Triples per evaluation chunk.
    #[arg(long, default_value_t = 4)]
    test_batch_size: usize,

    /// Average positive and negative terms without subsampling weights.
    #[arg(long)]
    uni_weight: bool,

    /// Use 1/sqrt(count) subsampling weights instead of 1.0.
    #[arg(long)]
    frequency_subsampling: bool,

    #[arg(long = "learning-rate", visible_alias = "lr", default_value_t = 1e-4)]
    learning_rate: f32,

    /// Worker threads for sampling and evaluation.
    #[arg(long = "cpu-num", default_value_t = 10)]
    cpu_num: usize,

    /// Checkpoint directory to resume from.
    #[arg(long = "init-checkpoint", visible_alias = "init")]
    init_checkpoint: Option<PathBuf>,

    /// Directory for checkpoints and logs.
    #[arg(long = "save-path", visible_alias = "save")]
    save_path: Option<PathBuf>,

    /// Never write checkpoints.
    #[arg(long)]
    no_save: bool,

    #[arg(long, default_value_t = 100_000)]
    max_steps: u64,

    /// Learning-rate decay threshold; defaults to max-steps.
    #[arg(long)]
    warm_up_steps: Option<u64>,

    #[arg(long, default_value_t = 10_000)]
    save_checkpoint_steps: u64,

    #[arg(long, default_value_t = 10_000)]
    valid_steps: u64,

    /// Steps between averaged training-loss logs.
    #[arg(long, default_value_t = 100)]
    log_steps: u64,

    /// Evaluation chunks between progress logs.
    #[arg(long, default_value_t = 1000)]
    test_log_steps: usize,

    /// Negative reweighting: clf or KBGAN.
    #[arg(long)]
    method: Option<Method>,

    /// Tag of the injected fake file (fake<TAG>.json).
    #[arg(long)]
    fake: Option<String>,

    /// Soft/hard repeat count (1: always soft, 1000: always hard).
    #[arg(long, default_value_t = 1)]
    num: u32,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Share of a new confidence in a soft refresh.
    #[arg(long, default_value_t = 0.5)]
    confidence_smoothing: f32,

    /// Hard refresh keeps triples whose confidence reaches this value.
    #[arg(long, default_value_t = 0.5)]
    confidence_threshold: f32,

    /// Steps between confidence refreshes in clf mode.
    #[arg(long, default_value_t = 10_001)]
    refresh_interval: u64,

    /// Generator/classifier epochs per refresh.
    #[arg(long, default_value_t = 200)]
    gan_epochs: usize,

    /// Classifier-only epochs per refresh.
    #[arg(long, default_value_t = 200)]
    classifier_epochs: usize,

    /// Classifier epochs before training resumes from a checkpoint.
    #[arg(long, default_value_t = 1200)]
    classifier_warmup_epochs: usize,

    /// Steps between averaged KBGAN reward logs.
    #[arg(long, default_value_t = 300)]
    kbgan_log_steps: u64,

    /// Overwrite an existing log file without asking.
    #[arg(short = 'y', long)]
    yes: bool,
}

impl Cli {
    fn into_config(self) -> RunConfig {
        RunConfig {
            do_train: self.do_train,
            do_valid: self.do_valid,
            do_test: self.do_test,
            evaluate_train: self.evaluate_train,
            data_path: self.data_path,
            train_set: self.train_set,
            model: self.model,
            double_entity_embedding: self.double_entity_embedding,
            double_relation_embedding: self.double_relation_embedding,
            negative_sample_size: self.negative_sample_size,
            hidden_dim: self.hidden_dim,
            gen_dim: self.gen_dim,
            gamma: self.gamma,
            negative_adversarial_sampling: self.negative_adversarial_sampling,
            adversarial_temperature: self.adversarial_temperature,
            batch_size: self.batch_size,
            regularization: self.regularization,
            test_batch_size: self.test_batch_size,
            uni_weight: self.uni_weight,
            frequency_subsampling: self.frequency_subsampling,
            learning_rate: self.learning_rate,
            cpu_num: self.cpu_num,
            init_checkpoint: self.init_checkpoint,
            save_path: self.save_path,
            no_save: self.no_save,
            max_steps: self.max_steps,
            warm_up_steps: self.warm_up_steps,
            save_checkpoint_steps: self.save_checkpoint_steps,
            valid_steps: self.valid_steps,
            log_steps: self.log_steps,
            test_log_steps: self.test_log_steps,
            method: self.method,
            fake: self.fake,
            num: self.num,
            seed: self.seed,
            confidence_smoothing: self.confidence_smoothing,
            confidence_threshold: self.confidence_threshold,
            refresh_interval: self.refresh_interval,
            gan_epochs: self.gan_epochs,
            classifier_epochs: self.classifier_epochs,
            classifier_warmup_epochs: self.classifier_warmup_epochs,
            kbgan_log_steps: self.kbgan_log_steps,
            ..RunConfig::default()
        }
    }
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok();

    let cli = Cli::parse();
    let yes = cli.yes;
    let config = cli.into_config().resolve()?;

    if let Some(dir) = &config.save_path {
        std::fs::create_dir_all(dir).into_diagnostic()?;
    }

    let log_file = config.log_file();
    if let Some(path) = &log_file {
        if path.exists() && !yes {
            let stdin = BufReader::new(std::io::stdin());
            let answer =
                logging::confirm_overwrite(path, stdin, std::io::stdout()).into_diagnostic()?;
            if answer == Overwrite::Abort {
                return Ok(());
            }
        }
    }
    logging::init(log_file.as_deref())?;

    let mut engine = Engine::new(config)?;
    tracing::info!("{}", engine.info());
    engine.run()?;
    Ok(())
}
