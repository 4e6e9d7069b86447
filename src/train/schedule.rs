//! Step-driven schedules of the training loop.

use serde::{Deserialize, Serialize};

/// Where the orchestrator currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainPhase {
    Idle,
    /// Classifier-only epochs before the first main step of a resumed run.
    ClassifierWarmup,
    MainStep,
    /// Generator/classifier adversarial epochs of a refresh.
    GanSubloop,
    /// Classifier-only epochs closing a refresh.
    ClassifierRefresh,
    Done,
}

impl std::fmt::Display for TrainPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TrainPhase::Idle => "idle",
            TrainPhase::ClassifierWarmup => "classifier warm-up",
            TrainPhase::MainStep => "main step",
            TrainPhase::GanSubloop => "GAN sub-loop",
            TrainPhase::ClassifierRefresh => "classifier refresh",
            TrainPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Step-wise learning-rate decay.
///
/// Once `step >= warm_up_steps` the rate drops tenfold and the threshold
/// triples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WarmUp {
    pub learning_rate: f32,
    pub warm_up_steps: u64,
}

impl WarmUp {
    pub fn new(learning_rate: f32, warm_up_steps: u64) -> Self {
        Self {
            learning_rate,
            warm_up_steps,
        }
    }

    /// New learning rate if `step` crossed the threshold; the optimizer must
    /// then be rebuilt.
    pub fn after_step(&mut self, step: u64) -> Option<f32> {
        if step < self.warm_up_steps {
            return None;
        }
        self.learning_rate /= 10.0;
        self.warm_up_steps = self.warm_up_steps.saturating_mul(3);
        Some(self.learning_rate)
    }
}

/// Fires on every multiple of `interval`, including step 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Every(pub u64);

impl Every {
    pub fn is_due(self, step: u64) -> bool {
        self.0 != 0 && step % self.0 == 0
    }

    /// Like [`Every::is_due`] but never on step 0.
    pub fn is_due_after_start(self, step: u64) -> bool {
        step > 0 && self.is_due(step)
    }
}
