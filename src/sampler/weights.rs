//! Shared per-triple subsampling / confidence weights.
//!
//! One [`WeightTable`] is created per run and cloned as a handle into every
//! dataset view (head- and tail-corruption, classifier pool, generator pool).
//! All clones see the same entries, so an update made between steps is
//! visible to every sampler on its next batch.
//!
//! Sampler workers only read. Writes happen on the training thread between
//! steps (initialisation, confidence refresh, checkpoint restore).

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::graph::Triple;

/// Reference-counted handle to the shared weight map.
#[derive(Debug, Clone, Default)]
pub struct WeightTable {
    inner: Arc<DashMap<Triple, f32>>,
}

impl WeightTable {
    /// A table with weight 1.0 for every distinct triple.
    pub fn uniform(triples: &[Triple]) -> Self {
        let table = Self::default();
        for triple in triples {
            table.inner.insert(*triple, 1.0);
        }
        table
    }

    /// Word2vec-style frequency weights: `1 / sqrt(count(h, r) + count(t, -r-1))`,
    /// with both counts starting at 4.
    pub fn frequency(triples: &[Triple]) -> Self {
        // Keys distinguish (head, relation) from (tail, inverse relation).
        let mut counts: HashMap<(u32, i64), u32> = HashMap::new();
        for t in triples {
            *counts.entry((t.head, t.relation as i64)).or_insert(4) += 1;
            *counts
                .entry((t.tail, -(t.relation as i64) - 1))
                .or_insert(4) += 1;
        }

        let table = Self::default();
        for t in triples {
            let count = counts[&(t.head, t.relation as i64)]
                + counts[&(t.tail, -(t.relation as i64) - 1)];
            table.inner.insert(*t, 1.0 / (count as f32).sqrt());
        }
        table
    }

    /// Current weight of `triple`. Triples outside the table weigh 1.0.
    pub fn get(&self, triple: &Triple) -> f32 {
        self.inner.get(triple).map(|w| *w.value()).unwrap_or(1.0)
    }

    /// Whether the table has an entry for `triple`.
    pub fn contains(&self, triple: &Triple) -> bool {
        self.inner.contains_key(triple)
    }

    /// Overwrite the weight of `triple`.
    pub fn set(&self, triple: Triple, weight: f32) {
        self.inner.insert(triple, weight);
    }

    /// Number of distinct triples with a weight.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Sum of all weights.
    pub fn total(&self) -> f64 {
        self.inner.iter().map(|e| *e.value() as f64).sum()
    }

    /// Whether two handles point at the same table.
    pub fn shares_with(&self, other: &WeightTable) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// All entries sorted by triple, for persistence.
    pub fn snapshot(&self) -> Vec<(Triple, f32)> {
        let mut entries: Vec<(Triple, f32)> =
            self.inner.iter().map(|e| (*e.key(), *e.value())).collect();
        entries.sort_unstable_by_key(|(t, _)| *t);
        entries
    }

    /// Overwrite entries from a snapshot. Entries not in the snapshot are kept.
    pub fn restore(&self, entries: &[(Triple, f32)]) {
        for &(triple, weight) in entries {
            self.inner.insert(triple, weight);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_table_covers_every_triple() {
        let triples = [Triple::new(0, 0, 1), Triple::new(1, 0, 2), Triple::new(0, 0, 1)];
        let table = WeightTable::uniform(&triples);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(&Triple::new(1, 0, 2)), 1.0);
    }

    #[test]
    fn clones_share_updates() {
        let table = WeightTable::uniform(&[Triple::new(0, 0, 1)]);
        let view = table.clone();
        table.set(Triple::new(0, 0, 1), 0.25);
        assert_eq!(view.get(&Triple::new(0, 0, 1)), 0.25);
        assert!(view.shares_with(&table));
        assert!(!view.shares_with(&WeightTable::default()));
    }

    #[test]
    fn frequency_weights_shrink_for_hubs() {
        // (0, r0) appears three times, (5, r0) once.
        let triples = [
            Triple::new(0, 0, 1),
            Triple::new(0, 0, 2),
            Triple::new(0, 0, 3),
            Triple::new(5, 0, 6),
        ];
        let table = WeightTable::frequency(&triples);
        let hub = table.get(&Triple::new(0, 0, 1));
        let lone = table.get(&Triple::new(5, 0, 6));
        assert!(hub < lone);
        // count(5, r0) = 5, count(6, inverse r0) = 5.
        assert!((lone - 1.0 / 10f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn snapshot_restore_round_trip() {
        let table = WeightTable::uniform(&[Triple::new(0, 0, 1), Triple::new(2, 0, 1)]);
        table.set(Triple::new(2, 0, 1), 0.0);
        let snap = table.snapshot();
        let fresh = WeightTable::uniform(&[Triple::new(0, 0, 1), Triple::new(2, 0, 1)]);
        fresh.restore(&snap);
        assert_eq!(fresh.snapshot(), snap);
    }
}
