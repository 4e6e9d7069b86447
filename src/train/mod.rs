//! Training orchestrator.
//!
//! [`Trainer`] drives the step loop of an [`Engine`]: plain or KBGAN main
//! steps, learning-rate warm-up, periodic confidence refreshes in clf mode,
//! metric logging, validation and checkpointing.

pub mod kbgan;
pub mod schedule;

use std::collections::HashSet;

use crate::config::Method;
use crate::confidence::CLASSIFIER_LEARNING_RATE;
use crate::confidence::generator::AnyGenerator;
use crate::confidence::mode::ConfidenceSchedule;
use crate::engine::{Engine, Split};
use crate::error::{KgeResult, TrainError};
use crate::graph::Triple;
use crate::logging::log_metrics;
use crate::model::StepLog;
use crate::model::optim::EmbeddingOptimizer;

use self::kbgan::kbgan_step;
use self::schedule::{Every, TrainPhase, WarmUp};

/// Classifier warm-up epochs per log line.
const WARMUP_LOG_EPOCHS: usize = 200;

/// Step loop over a borrowed [`Engine`].
pub struct Trainer<'a> {
    engine: &'a mut Engine,
    phase: TrainPhase,
    schedule: ConfidenceSchedule,
    warm_up: WarmUp,
}

impl<'a> Trainer<'a> {
    pub fn new(engine: &'a mut Engine) -> Self {
        let warm_up = WarmUp::new(engine.current_learning_rate, engine.warm_up_steps);
        let schedule = ConfidenceSchedule::new(engine.config.num);
        Self {
            engine,
            phase: TrainPhase::Idle,
            schedule,
            warm_up,
        }
    }

    pub fn phase(&self) -> TrainPhase {
        self.phase
    }

    fn enter(&mut self, phase: TrainPhase) {
        if self.phase != phase {
            tracing::debug!(from = %self.phase, to = %phase, "phase change");
            self.phase = phase;
        }
    }

    /// Run `0..max_steps`, then write the final checkpoint.
    pub fn run(&mut self) -> KgeResult<()> {
        let config = &self.engine.config;
        tracing::info!("Start Training...");
        tracing::info!("init_step = 0");
        tracing::info!("batch_size = {}", config.batch_size);
        tracing::info!("negative_adversarial_sampling = {}", config.negative_adversarial_sampling);
        tracing::info!("hidden_dim = {}", config.hidden_dim);
        tracing::info!("gamma = {:.6}", config.gamma);
        if config.negative_adversarial_sampling {
            tracing::info!("adversarial_temperature = {:.6}", config.adversarial_temperature);
        }
        tracing::info!("learning_rate = {}", self.warm_up.learning_rate);

        if config.method == Some(Method::Clf) && config.init_checkpoint.is_some() {
            self.classifier_warmup()?;
        }

        let max_steps = self.engine.config.max_steps;
        let refresh = Every(self.engine.config.refresh_interval);
        let save = Every(self.engine.config.save_checkpoint_steps);
        let log = Every(self.engine.config.log_steps);
        let valid = Every(self.engine.config.valid_steps);
        let kbgan_log = Every(self.engine.config.kbgan_log_steps);
        let opts = self.engine.loss_options();

        let mut training_logs: Vec<StepLog> = Vec::new();
        let mut kbgan_rewards: Vec<f32> = Vec::new();
        let mut kbgan_losses: Vec<f32> = Vec::new();

        for step in 0..max_steps {
            if self.engine.config.method == Some(Method::Clf) && refresh.is_due(step) {
                self.refresh(step)?;
            }

            self.enter(TrainPhase::MainStep);
            let engine = &mut *self.engine;
            let batch = engine.train_iter.next_batch();
            let step_log = match engine.config.method {
                Some(Method::Kbgan) => {
                    let Some(AnyGenerator::Embedding(generator)) = engine.generator.as_mut() else {
                        return Err(missing(Method::Kbgan, "an embedding generator").into());
                    };
                    let out = kbgan_step(
                        &mut engine.model,
                        &mut engine.optimizer,
                        generator,
                        &batch,
                        &opts,
                        &mut engine.rng,
                    );
                    kbgan_rewards.push(out.reward);
                    kbgan_losses.push(out.step.loss);
                    if kbgan_log.is_due_after_start(step) {
                        let (reward, loss) = (mean(&kbgan_rewards), mean(&kbgan_losses));
                        tracing::info!("Training average reward at step {step}: {reward:.6}");
                        tracing::info!("Training average loss at step {step}: {loss:.6}");
                        kbgan_rewards.clear();
                        kbgan_losses.clear();
                    }
                    out.step
                }
                _ => engine.model.train_step(&mut engine.optimizer, &batch, &opts),
            };
            training_logs.push(step_log);
            engine.step = step;

            if let Some(lr) = self.warm_up.after_step(step) {
                tracing::info!("Change learning_rate to {lr:.6} at step {step}");
                let engine = &mut *self.engine;
                engine.current_learning_rate = lr;
                engine.warm_up_steps = self.warm_up.warm_up_steps;
                engine.optimizer = EmbeddingOptimizer::new(lr, &engine.model);
            }

            if save.is_due(step) {
                self.engine.save_checkpoint()?;
            }

            if log.is_due(step) {
                log_metrics("Training average", step, &average(&training_logs));
                training_logs.clear();
            }

            if self.engine.config.do_valid && valid.is_due(step) {
                self.engine.evaluate_split(Split::Valid, step);
            }
        }

        self.enter(TrainPhase::Done);
        self.engine.save_checkpoint()?;
        Ok(())
    }

    /// Classifier-only epochs before the first main step of a resumed run,
    /// then a fresh classifier optimizer.
    fn classifier_warmup(&mut self) -> KgeResult<()> {
        self.enter(TrainPhase::ClassifierWarmup);
        let engine = &mut *self.engine;
        let epochs = engine.config.classifier_warmup_epochs;
        let parts = engine
            .clf
            .as_mut()
            .ok_or_else(|| missing(Method::Clf, "a confidence classifier"))?;
        for epoch in 0..epochs {
            let out = parts.classifier.train_classifier_step(&engine.model, &mut parts.clf_iter);
            if warmup_log_due(epoch) {
                log_metrics("Classifier warm-up", epoch as u64, &out.entries());
            }
        }
        parts.classifier.reset_optimizer(CLASSIFIER_LEARNING_RATE);
        Ok(())
    }

    /// Advance the soft/hard mode, rewrite the weight table, then run the GAN
    /// and classifier sub-loops.
    fn refresh(&mut self, step: u64) -> KgeResult<()> {
        let mode = self.schedule.advance();
        let engine = &mut *self.engine;
        let parts = engine
            .clf
            .as_mut()
            .ok_or_else(|| missing(Method::Clf, "a confidence classifier"))?;
        let generator = engine
            .generator
            .as_mut()
            .ok_or_else(|| missing(Method::Clf, "a generator"))?;

        let fakes = &engine.store.fakes;
        if !fakes.is_empty() {
            let fake_conf = parts.classifier.score(&engine.model, fakes);
            let fake_percent = fake_conf.iter().sum::<f32>() / fake_conf.len() as f32;
            tracing::info!("fake percent {fake_percent:.6} in {}", fake_conf.len());
            let fake_set: HashSet<&Triple> = fakes.iter().collect();
            let pooled_fakes = parts.pool.iter().filter(|t| fake_set.contains(t)).count();
            let pooled = parts.pool.len();
            tracing::info!("fake triples in classifier training {pooled_fakes} / {pooled}");
        }

        let report = parts.classifier.find_topk_triples(
            &engine.model,
            &[&engine.store.train[..], &parts.pool[..]],
            &engine.weights,
            mode,
        );
        tracing::info!(
            step,
            %mode,
            updated = report.updated,
            judged_fake = report.judged_fake,
            "confidence refresh, fraction judged fake {:.6}",
            report.fake_fraction()
        );

        self.phase = TrainPhase::GanSubloop;
        for _ in 0..engine.config.gan_epochs {
            parts.classifier.train_gan_step(
                &engine.model,
                &mut *generator,
                &mut parts.gen_iter,
                &mut engine.rng,
            );
        }

        self.phase = TrainPhase::ClassifierRefresh;
        for epoch in 0..engine.config.classifier_epochs {
            let out = parts.classifier.train_classifier_step(&engine.model, &mut parts.clf_iter);
            if epoch % 100 == 0 {
                log_metrics("Classifier", epoch as u64, &out.entries());
            }
        }
        Ok(())
    }
}

fn missing(method: Method, component: &str) -> TrainError {
    TrainError::MissingComponent {
        method: method.to_string(),
        component: component.to_string(),
    }
}

/// Warm-up logs after each full block of epochs, never on epoch 0.
fn warmup_log_due(epoch: usize) -> bool {
    (epoch + 1) % WARMUP_LOG_EPOCHS == 0
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

/// Per-metric mean over `logs`, keyed like [`StepLog::entries`].
fn average(logs: &[StepLog]) -> Vec<(&'static str, f32)> {
    let Some(first) = logs.first() else {
        return Vec::new();
    };
    let mut sums = first.entries();
    for log in &logs[1..] {
        for ((_, sum), (_, v)) in sums.iter_mut().zip(log.entries()) {
            *sum += v;
        }
    }
    let n = logs.len() as f32;
    for (_, sum) in &mut sums {
        *sum /= n;
    }
    sums
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(loss: f32, reg: Option<f32>) -> StepLog {
        StepLog {
            positive_sample_loss: loss,
            negative_sample_loss: loss * 2.0,
            regularization: reg,
            loss: loss * 3.0,
        }
    }

    #[test]
    fn average_is_per_metric() {
        let avg = average(&[log(1.0, None), log(3.0, None)]);
        let names: Vec<_> = avg.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, ["positive_sample_loss", "negative_sample_loss", "loss"]);
        assert_eq!(avg[0].1, 2.0);
        assert_eq!(avg[1].1, 4.0);
        assert_eq!(avg[2].1, 6.0);
    }

    #[test]
    fn average_keeps_regularization() {
        let avg = average(&[log(1.0, Some(0.5)), log(1.0, Some(1.5))]);
        assert_eq!(avg[2], ("regularization", 1.0));
    }

    #[test]
    fn warmup_logs_at_the_end_of_each_block() {
        assert!(!warmup_log_due(0));
        assert!(warmup_log_due(199));
        assert!(!warmup_log_due(200));
        assert_eq!((0..1200).filter(|&e| warmup_log_due(e)).count(), 6);
    }

    #[test]
    fn empty_average_is_empty() {
        assert!(average(&[]).is_empty());
        assert_eq!(mean(&[]), 0.0);
    }
}
