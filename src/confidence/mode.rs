//! Soft/hard weight-update mode and its transition rule.

use serde::{Deserialize, Serialize};

/// Repeat count that pins the schedule to [`ConfidenceMode::Hard`].
pub const HARD_SENTINEL: u32 = 1000;

/// How a confidence refresh writes into the weight table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceMode {
    /// `w ← α·c + (1 − α)·w`.
    Soft,
    /// `w ← 1` if `c ≥ threshold`, else `0`.
    Hard,
}

impl std::fmt::Display for ConfidenceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfidenceMode::Soft => write!(f, "soft"),
            ConfidenceMode::Hard => write!(f, "hard"),
        }
    }
}

/// Two-state machine advanced once per refresh.
///
/// A repeat count of 1 pins `Soft`, [`HARD_SENTINEL`] pins `Hard`, anything
/// else alternates starting with `Soft`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceSchedule {
    repeat: u32,
    current: ConfidenceMode,
}

impl ConfidenceSchedule {
    pub fn new(repeat: u32) -> Self {
        Self {
            repeat,
            current: ConfidenceMode::Hard,
        }
    }

    /// Mode of the most recent refresh.
    pub fn current(&self) -> ConfidenceMode {
        self.current
    }

    /// Move to the mode of the next refresh and return it.
    pub fn advance(&mut self) -> ConfidenceMode {
        self.current = match (self.repeat, self.current) {
            (1, _) => ConfidenceMode::Soft,
            (HARD_SENTINEL, _) => ConfidenceMode::Hard,
            (_, ConfidenceMode::Soft) => ConfidenceMode::Hard,
            (_, ConfidenceMode::Hard) => ConfidenceMode::Soft,
        };
        self.current
    }
}
