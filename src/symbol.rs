//! Entity and relation vocabularies.
//!
//! A [`Vocabulary`] maps names to dense zero-based ids and back. It is loaded
//! once from a `.dict` file (`id<TAB>name` per line) and never changes after.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// Classification of a vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    /// Entities fill the head and tail positions.
    Entity,
    /// Relations fill the middle position.
    Relation,
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SymbolKind::Entity => write!(f, "entity"),
            SymbolKind::Relation => write!(f, "relation"),
        }
    }
}

/// Bijective name ↔ id mapping over `[0, len)`.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    kind: SymbolKind,
    names: Vec<String>,
    ids: HashMap<String, u32>,
}

impl Vocabulary {
    /// Build a vocabulary from names listed in id order.
    pub fn from_names(kind: SymbolKind, names: Vec<String>) -> Result<Self, DataError> {
        let mut ids = HashMap::with_capacity(names.len());
        for (id, name) in names.iter().enumerate() {
            if ids.insert(name.clone(), id as u32).is_some() {
                return Err(DataError::NotBijective {
                    path: "<memory>".into(),
                    kind: kind.to_string(),
                    len: names.len(),
                });
            }
        }
        Ok(Self { kind, names, ids })
    }

    /// Load a `.dict` file.
    ///
    /// Lines are `id<TAB>name`; ids must cover `[0, n)` exactly once.
    pub fn load(path: &Path, kind: SymbolKind) -> Result<Self, DataError> {
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| DataError::Io {
            path: display.clone(),
            source,
        })?;
        Self::parse(&content, &display, kind)
    }

    /// Parse dictionary text. `origin` is only used in error messages.
    pub fn parse(content: &str, origin: &str, kind: SymbolKind) -> Result<Self, DataError> {
        let mut entries: Vec<(usize, String)> = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != 2 {
                return Err(DataError::MalformedLine {
                    path: origin.to_string(),
                    line: lineno + 1,
                    expected: 2,
                    found: fields.len(),
                });
            }
            let id = fields[0].parse::<usize>().map_err(|_| DataError::InvalidId {
                path: origin.to_string(),
                line: lineno + 1,
                value: fields[0].to_string(),
            })?;
            entries.push((id, fields[1].to_string()));
        }

        let len = entries.len();
        let not_bijective = || DataError::NotBijective {
            path: origin.to_string(),
            kind: kind.to_string(),
            len,
        };

        let mut names: Vec<Option<String>> = vec![None; len];
        for (id, name) in entries {
            let slot = names.get_mut(id).ok_or_else(not_bijective)?;
            if slot.is_some() {
                return Err(not_bijective());
            }
            *slot = Some(name);
        }
        let names: Vec<String> = names
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(not_bijective)?;

        Self::from_names(kind, names).map_err(|_| not_bijective())
    }

    /// The id for `name`, if present.
    pub fn id(&self, name: &str) -> Option<u32> {
        self.ids.get(name).copied()
    }

    /// The name for `id`, if in range.
    pub fn name(&self, id: u32) -> Option<&str> {
        self.names.get(id as usize).map(String::as_str)
    }

    /// Number of symbols.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn kind(&self) -> SymbolKind {
        self.kind
    }
}
