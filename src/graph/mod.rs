//! Triples and the known-truth index.
//!
//! - [`Triple`]: an immutable `(head, relation, tail)` id triple
//! - [`CorruptionMode`]: which end of a triple a negative sample replaces
//! - [`index::TrueTripleIndex`]: every known-true completion for filtering

pub mod index;

use serde::{Deserialize, Serialize};

/// A `(head, relation, tail)` fact over dense vocabulary ids.
///
/// Identity is value equality. Lists of triples may contain duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Triple {
    pub head: u32,
    pub relation: u32,
    pub tail: u32,
}

impl Triple {
    pub const fn new(head: u32, relation: u32, tail: u32) -> Self {
        Self {
            head,
            relation,
            tail,
        }
    }

    /// The triple with the corrupted end replaced by `entity`.
    pub fn corrupt(self, mode: CorruptionMode, entity: u32) -> Self {
        match mode {
            CorruptionMode::HeadBatch => Self {
                head: entity,
                ..self
            },
            CorruptionMode::TailBatch => Self {
                tail: entity,
                ..self
            },
        }
    }

    /// The entity at the end `mode` corrupts.
    pub fn corrupted_end(self, mode: CorruptionMode) -> u32 {
        match mode {
            CorruptionMode::HeadBatch => self.head,
            CorruptionMode::TailBatch => self.tail,
        }
    }
}

impl From<(u32, u32, u32)> for Triple {
    fn from((head, relation, tail): (u32, u32, u32)) -> Self {
        Self::new(head, relation, tail)
    }
}

impl std::fmt::Display for Triple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.head, self.relation, self.tail)
    }
}

/// Which end of a triple a negative sample replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CorruptionMode {
    /// Negatives replace the head entity.
    HeadBatch,
    /// Negatives replace the tail entity.
    TailBatch,
}

impl CorruptionMode {
    pub const BOTH: [CorruptionMode; 2] = [CorruptionMode::HeadBatch, CorruptionMode::TailBatch];
}

impl std::fmt::Display for CorruptionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CorruptionMode::HeadBatch => write!(f, "head-batch"),
            CorruptionMode::TailBatch => write!(f, "tail-batch"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_replaces_only_the_chosen_end() {
        let t = Triple::new(1, 2, 3);
        assert_eq!(t.corrupt(CorruptionMode::HeadBatch, 9), Triple::new(9, 2, 3));
        assert_eq!(t.corrupt(CorruptionMode::TailBatch, 9), Triple::new(1, 2, 9));
        assert_eq!(t.corrupted_end(CorruptionMode::HeadBatch), 1);
        assert_eq!(t.corrupted_end(CorruptionMode::TailBatch), 3);
    }

    #[test]
    fn mode_display_matches_batch_names() {
        assert_eq!(CorruptionMode::HeadBatch.to_string(), "head-batch");
        assert_eq!(CorruptionMode::TailBatch.to_string(), "tail-batch");
    }
}
