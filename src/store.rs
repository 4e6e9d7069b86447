//! Dataset loading.
//!
//! A dataset directory holds `entities.dict`, `relations.dict` and the
//! tab-separated `train.txt` / `valid.txt` / `test.txt` splits, with names
//! instead of ids. An optional `fake<TAG>.json` lists id triples that are
//! injected into the training split as noise.

use std::path::{Path, PathBuf};

use crate::error::DataError;
use crate::graph::Triple;
use crate::graph::index::TrueTripleIndex;
use crate::symbol::{SymbolKind, Vocabulary};

/// All splits of one dataset, mapped to ids.
#[derive(Debug, Clone)]
pub struct TripleStore {
    pub entities: Vocabulary,
    pub relations: Vocabulary,
    /// Training triples, including injected fakes.
    pub train: Vec<Triple>,
    pub valid: Vec<Triple>,
    pub test: Vec<Triple>,
    /// The injected triples alone (empty without a fake tag).
    pub fakes: Vec<Triple>,
}

impl TripleStore {
    /// Load a dataset directory.
    ///
    /// `train_set` names the training file; `fake_tag` selects `fake<TAG>.json`.
    pub fn load(
        data_path: &Path,
        train_set: &str,
        fake_tag: Option<&str>,
    ) -> Result<Self, DataError> {
        let entities = Vocabulary::load(&data_path.join("entities.dict"), SymbolKind::Entity)?;
        let relations = Vocabulary::load(&data_path.join("relations.dict"), SymbolKind::Relation)?;

        let mut train = read_triples(&data_path.join(train_set), &entities, &relations)?;
        let fakes = match fake_tag {
            Some(tag) => read_fakes(&fake_path(data_path, tag), &entities, &relations)?,
            None => Vec::new(),
        };
        train.extend_from_slice(&fakes);

        let valid = read_triples(&data_path.join("valid.txt"), &entities, &relations)?;
        let test = read_triples(&data_path.join("test.txt"), &entities, &relations)?;

        tracing::info!(
            entities = entities.len(),
            relations = relations.len(),
            train = train.len(),
            fakes = fakes.len(),
            valid = valid.len(),
            test = test.len(),
            "loaded dataset from {}",
            data_path.display()
        );

        Ok(Self {
            entities,
            relations,
            train,
            valid,
            test,
            fakes,
        })
    }

    pub fn nentity(&self) -> usize {
        self.entities.len()
    }

    pub fn nrelation(&self) -> usize {
        self.relations.len()
    }

    /// Index over train (fakes included), valid and test.
    pub fn true_index(&self) -> TrueTripleIndex {
        TrueTripleIndex::build([&self.train[..], &self.valid[..], &self.test[..]])
    }
}

/// Path of the fake triple file for `tag`.
pub fn fake_path(data_path: &Path, tag: &str) -> PathBuf {
    data_path.join(format!("fake{tag}.json"))
}

/// Read a `head<TAB>relation<TAB>tail` file and map names to ids.
///
/// Any malformed line aborts the whole read.
pub fn read_triples(
    path: &Path,
    entities: &Vocabulary,
    relations: &Vocabulary,
) -> Result<Vec<Triple>, DataError> {
    let display = path.display().to_string();
    let content = std::fs::read_to_string(path).map_err(|source| DataError::Io {
        path: display.clone(),
        source,
    })?;
    parse_triples(&content, &display, entities, relations)
}

/// Parse triple-file text. `origin` is only used in error messages.
pub fn parse_triples(
    content: &str,
    origin: &str,
    entities: &Vocabulary,
    relations: &Vocabulary,
) -> Result<Vec<Triple>, DataError> {
    let mut triples = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        let &[h, r, t] = fields.as_slice() else {
            return Err(DataError::MalformedLine {
                path: origin.to_string(),
                line: lineno + 1,
                expected: 3,
                found: fields.len(),
            });
        };
        let lookup = |vocab: &Vocabulary, name: &str| {
            vocab.id(name).ok_or_else(|| DataError::UnknownName {
                path: origin.to_string(),
                line: lineno + 1,
                kind: vocab.kind().to_string(),
                name: name.to_string(),
            })
        };
        triples.push(Triple::new(
            lookup(entities, h)?,
            lookup(relations, r)?,
            lookup(entities, t)?,
        ));
    }
    Ok(triples)
}

/// Read injected id triples and check them against the vocabularies.
pub fn read_fakes(
    path: &Path,
    entities: &Vocabulary,
    relations: &Vocabulary,
) -> Result<Vec<Triple>, DataError> {
    let display = path.display().to_string();
    let content = std::fs::read_to_string(path).map_err(|source| DataError::Io {
        path: display.clone(),
        source,
    })?;
    let raw: Vec<(u32, u32, u32)> =
        serde_json::from_str(&content).map_err(|e| DataError::FakeFormat {
            path: display,
            message: e.to_string(),
        })?;

    raw.into_iter()
        .map(|(head, relation, tail)| {
            let in_range = (head as usize) < entities.len()
                && (tail as usize) < entities.len()
                && (relation as usize) < relations.len();
            if in_range {
                Ok(Triple::new(head, relation, tail))
            } else {
                Err(DataError::FakeOutOfRange {
                    head,
                    relation,
                    tail,
                    nentity: entities.len(),
                    nrelation: relations.len(),
                })
            }
        })
        .collect()
}

/// Write a fake triple file in the format [`read_fakes`] expects.
pub fn write_fakes(path: &Path, fakes: &[Triple]) -> Result<(), DataError> {
    let raw: Vec<(u32, u32, u32)> = fakes.iter().map(|t| (t.head, t.relation, t.tail)).collect();
    let json = serde_json::to_string(&raw).map_err(|e| DataError::FakeFormat {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    std::fs::write(path, json).map_err(|source| DataError::Io {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_dataset(dir: &Path) {
        std::fs::write(dir.join("entities.dict"), "0\tA\n1\tB\n2\tC\n3\tD\n").unwrap();
        std::fs::write(dir.join("relations.dict"), "0\tr\n").unwrap();
        std::fs::write(dir.join("train.txt"), "A\tr\tB\nB\tr\tC\n").unwrap();
        std::fs::write(dir.join("valid.txt"), "C\tr\tD\n").unwrap();
        std::fs::write(dir.join("test.txt"), "A\tr\tC\n").unwrap();
    }

    #[test]
    fn load_maps_names_to_ids() {
        let dir = TempDir::new().unwrap();
        write_dataset(dir.path());
        let store = TripleStore::load(dir.path(), "train.txt", None).unwrap();
        assert_eq!(store.nentity(), 4);
        assert_eq!(store.nrelation(), 1);
        assert_eq!(store.train, vec![Triple::new(0, 0, 1), Triple::new(1, 0, 2)]);
        assert_eq!(store.valid, vec![Triple::new(2, 0, 3)]);
        assert!(store.fakes.is_empty());
        assert_eq!(store.true_index().len(), 4);
    }

    #[test]
    fn fakes_are_appended_to_train() {
        let dir = TempDir::new().unwrap();
        write_dataset(dir.path());
        write_fakes(&fake_path(dir.path(), "1"), &[Triple::new(3, 0, 0)]).unwrap();
        let store = TripleStore::load(dir.path(), "train.txt", Some("1")).unwrap();
        assert_eq!(store.train.len(), 3);
        assert_eq!(store.train[2], Triple::new(3, 0, 0));
        assert_eq!(store.fakes, vec![Triple::new(3, 0, 0)]);
    }

    #[test]
    fn out_of_range_fake_is_rejected() {
        let dir = TempDir::new().unwrap();
        write_dataset(dir.path());
        std::fs::write(fake_path(dir.path(), "x"), "[[0, 5, 1]]").unwrap();
        let err = TripleStore::load(dir.path(), "train.txt", Some("x")).unwrap_err();
        assert!(matches!(err, DataError::FakeOutOfRange { relation: 5, .. }));
    }

    #[test]
    fn malformed_triple_line_aborts() {
        let dir = TempDir::new().unwrap();
        write_dataset(dir.path());
        std::fs::write(dir.path().join("test.txt"), "A\tr\tB\nA\tr\n").unwrap();
        let err = TripleStore::load(dir.path(), "train.txt", None).unwrap_err();
        assert!(matches!(
            err,
            DataError::MalformedLine {
                line: 2,
                expected: 3,
                found: 2,
                ..
            }
        ));
    }

    #[test]
    fn unknown_name_is_reported() {
        let dir = TempDir::new().unwrap();
        write_dataset(dir.path());
        std::fs::write(dir.path().join("valid.txt"), "A\tq\tB\n").unwrap();
        let err = TripleStore::load(dir.path(), "train.txt", None).unwrap_err();
        match err {
            DataError::UnknownName { kind, name, .. } => {
                assert_eq!(kind, "relation");
                assert_eq!(name, "q");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
