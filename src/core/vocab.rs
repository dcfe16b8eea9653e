//! Vocabulary and merge-table stores, plus their persisted file formats.
//!
//! The vocabulary is an injective, append-only mapping from token strings
//! (glyph sequences) to integer ids. Ids 0-255 are the 256 byte glyphs
//! (identity: id == byte value); ids from 256 upward are assigned in strict
//! creation order, one per accepted merge. The reverse mapping is updated
//! transactionally on every insert, so the two maps can never drift.
//!
//! Persisted formats:
//! - Vocabulary file: a flat JSON object, token string → id.
//! - Merge-rules file: one `left right` entry per line, in learned order
//!   (line 0 is rank 0), with an optional `#...` header line that is skipped.
//!   Glyph tokens never contain a literal space byte (space encodes as `Ġ`),
//!   so the two-field split is unambiguous.
//!
//! Malformed files are fatal at load time: the loader returns an error and no
//! partially-initialized store is ever produced.

use std::collections::BTreeMap;
use std::path::Path;

use rustc_hash::FxHashMap;
use thiserror::Error;

use super::glyph::glyph_for_byte;

/// Errors from loading or saving vocabulary and merge files.
#[derive(Error, Debug)]
pub enum VocabError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid vocabulary json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("duplicate id {id} for tokens {first:?} and {second:?}")]
    DuplicateId { id: u32, first: String, second: String },
    #[error("malformed merge entry on line {line}: {text:?}")]
    MalformedMerge { line: usize, text: String },
}

/// Injective token-string ↔ id store.
///
/// Mutation is append-only: ids are never reassigned or reused for the
/// lifetime of the store.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    token_to_id: FxHashMap<String, u32>,
    id_to_token: FxHashMap<u32, String>,
    next_id: u32,
}

impl Vocabulary {
    /// Empty vocabulary. Ids start at 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Vocabulary seeded with the 256 byte glyphs at ids 0-255.
    pub fn byte_level() -> Self {
        let mut vocab = Self::new();
        for b in 0u16..=255 {
            vocab.insert(glyph_for_byte(b as u8).to_string());
        }
        vocab
    }

    /// Insert a token, returning its id.
    ///
    /// Idempotent: a token already present keeps its original id, so the
    /// token → id mapping stays injective even when two different merges
    /// concatenate to the same display form.
    pub fn insert(&mut self, token: String) -> u32 {
        if let Some(&id) = self.token_to_id.get(&token) {
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.id_to_token.insert(id, token.clone());
        self.token_to_id.insert(token, id);
        id
    }

    /// Id of a token string, if known.
    pub fn id_of(&self, token: &str) -> Option<u32> {
        self.token_to_id.get(token).copied()
    }

    /// Token string for an id, if known.
    pub fn token_of(&self, id: u32) -> Option<&str> {
        self.id_to_token.get(&id).map(String::as_str)
    }

    /// Whether a token string is present.
    pub fn contains(&self, token: &str) -> bool {
        self.token_to_id.contains_key(token)
    }

    /// Number of tokens.
    pub fn len(&self) -> usize {
        self.token_to_id.len()
    }

    /// Whether the vocabulary is empty.
    pub fn is_empty(&self) -> bool {
        self.token_to_id.is_empty()
    }

    /// Iterate over `(token, id)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.token_to_id.iter().map(|(t, &id)| (t.as_str(), id))
    }
}

/// Ordered table of learned merges: pair → rank, rank == learned order.
///
/// Lower rank wins at encode time. A pair appears at most once; pushing a
/// duplicate returns the existing rank.
#[derive(Debug, Clone, Default)]
pub struct MergeTable {
    ranks: FxHashMap<(String, String), u32>,
    order: Vec<(String, String)>,
}

impl MergeTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pair, returning its rank.
    pub fn push(&mut self, left: String, right: String) -> u32 {
        if let Some(&rank) = self.ranks.get(&(left.clone(), right.clone())) {
            return rank;
        }
        let rank = self.order.len() as u32;
        self.order.push((left.clone(), right.clone()));
        self.ranks.insert((left, right), rank);
        rank
    }

    /// Rank of a pair, if it was learned.
    pub fn rank_of(&self, left: &str, right: &str) -> Option<u32> {
        self.ranks
            .get(&(left.to_owned(), right.to_owned()))
            .copied()
    }

    /// Whether a pair was learned.
    pub fn contains(&self, left: &str, right: &str) -> bool {
        self.rank_of(left, right).is_some()
    }

    /// Number of learned merges.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Pairs in learned order (index == rank).
    pub fn iter(&self) -> impl Iterator<Item = &(String, String)> {
        self.order.iter()
    }
}

/// Parse a vocabulary from flat JSON (`{"token": id, ...}`).
///
/// Duplicate ids are fatal: the store must stay injective in both directions.
pub fn load_vocabulary(data: &str) -> Result<Vocabulary, VocabError> {
    let raw: FxHashMap<String, u32> = serde_json::from_str(data)?;

    let mut id_to_token: FxHashMap<u32, String> = FxHashMap::default();
    let mut next_id = 0u32;
    for (token, &id) in raw.iter() {
        if let Some(first) = id_to_token.insert(id, token.clone()) {
            return Err(VocabError::DuplicateId {
                id,
                first,
                second: token.clone(),
            });
        }
        next_id = next_id.max(id + 1);
    }

    Ok(Vocabulary {
        token_to_id: raw,
        id_to_token,
        next_id,
    })
}

/// Load a vocabulary from a JSON file.
pub fn load_vocabulary_file<P: AsRef<Path>>(path: P) -> Result<Vocabulary, VocabError> {
    let data = std::fs::read_to_string(path)?;
    load_vocabulary(&data)
}

/// Write a vocabulary as flat JSON, tokens sorted for stable output.
pub fn save_vocabulary<P: AsRef<Path>>(vocab: &Vocabulary, path: P) -> Result<(), VocabError> {
    let sorted: BTreeMap<&str, u32> = vocab.iter().collect();
    let json = serde_json::to_string_pretty(&sorted)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Parse merge rules from their line-oriented text form.
///
/// Line order is rank order. A leading `#...` header line is skipped; blank
/// lines are ignored; anything else must be exactly two whitespace-separated
/// fields.
pub fn load_merges(data: &str) -> Result<MergeTable, VocabError> {
    let mut table = MergeTable::new();

    for (line_no, line) in data.lines().enumerate() {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            continue;
        }
        if line_no == 0 && trimmed.starts_with('#') {
            continue;
        }

        let mut fields = trimmed.split_whitespace();
        match (fields.next(), fields.next(), fields.next()) {
            (Some(left), Some(right), None) => {
                table.push(left.to_owned(), right.to_owned());
            }
            _ => {
                return Err(VocabError::MalformedMerge {
                    line: line_no,
                    text: trimmed.to_owned(),
                });
            }
        }
    }

    Ok(table)
}

/// Load merge rules from a file.
pub fn load_merges_file<P: AsRef<Path>>(path: P) -> Result<MergeTable, VocabError> {
    let data = std::fs::read_to_string(path)?;
    load_merges(&data)
}

/// Write merge rules in their line-oriented text form with a version header.
pub fn save_merges<P: AsRef<Path>>(table: &MergeTable, path: P) -> Result<(), VocabError> {
    let mut out = String::from("#version: 0.2\n");
    for (left, right) in table.iter() {
        out.push_str(left);
        out.push(' ');
        out.push_str(right);
        out.push('\n');
    }
    std::fs::write(path, out)?;
    Ok(())
}
