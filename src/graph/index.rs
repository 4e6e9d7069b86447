//! Known-truth index used to filter negatives and rankings.
//!
//! Two lookups are kept: `(head, relation) → tails` and
//! `(relation, tail) → heads`. The index is built once and is read-only
//! afterwards, so it is shared across sampler workers behind an `Arc`.

use std::collections::{HashMap, HashSet};

use super::{CorruptionMode, Triple};

/// Every true completion of every `(h, r, ?)` and `(?, r, t)` query.
#[derive(Debug, Clone, Default)]
pub struct TrueTripleIndex {
    /// (head, relation) → true tails.
    tails: HashMap<(u32, u32), HashSet<u32>>,
    /// (relation, tail) → true heads.
    heads: HashMap<(u32, u32), HashSet<u32>>,
    len: usize,
}

impl TrueTripleIndex {
    /// Build from any number of triple lists (train, valid, test, ...).
    pub fn build<'a>(sources: impl IntoIterator<Item = &'a [Triple]>) -> Self {
        let mut index = Self::default();
        for triples in sources {
            for triple in triples {
                index.insert(*triple);
            }
        }
        index
    }

    fn insert(&mut self, t: Triple) {
        let fresh = self
            .tails
            .entry((t.head, t.relation))
            .or_default()
            .insert(t.tail);
        self.heads
            .entry((t.relation, t.tail))
            .or_default()
            .insert(t.head);
        if fresh {
            self.len += 1;
        }
    }

    /// Whether the triple is known to be true.
    pub fn contains(&self, t: &Triple) -> bool {
        self.tails
            .get(&(t.head, t.relation))
            .is_some_and(|tails| tails.contains(&t.tail))
    }

    /// Whether replacing the `mode` end of `t` with `entity` yields a known truth.
    pub fn is_true_corruption(&self, t: &Triple, mode: CorruptionMode, entity: u32) -> bool {
        match mode {
            CorruptionMode::HeadBatch => self
                .heads
                .get(&(t.relation, t.tail))
                .is_some_and(|heads| heads.contains(&entity)),
            CorruptionMode::TailBatch => self
                .tails
                .get(&(t.head, t.relation))
                .is_some_and(|tails| tails.contains(&entity)),
        }
    }

    /// True tails of `(head, relation, ?)`.
    pub fn true_tails(&self, head: u32, relation: u32) -> Option<&HashSet<u32>> {
        self.tails.get(&(head, relation))
    }

    /// True heads of `(?, relation, tail)`.
    pub fn true_heads(&self, relation: u32, tail: u32) -> Option<&HashSet<u32>> {
        self.heads.get(&(relation, tail))
    }

    /// Number of distinct true triples.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
