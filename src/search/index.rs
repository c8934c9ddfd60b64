use std::collections::HashMap;
use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::normalize::{Normalizer, TermVector, WeightScheme, DEFAULT_MAX_DOCUMENT_BYTES};
use crate::error::CardResult;
use crate::store::{CardId, CardStore};

const INDEX_VERSION: u32 = 4;

/// Inverted index: stemmed token -> (card ID -> weight).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SearchIndex {
    /// Index format version (for migrations)
    pub version: u32,
    /// Normalizer settings the postings were computed with
    scheme: WeightScheme,
    max_bytes: usize,
    postings: HashMap<String, HashMap<CardId, f64>>,
    /// Tokens each card currently contributes, so re-indexing can purge them
    documents: HashMap<CardId, Vec<String>>,
}

impl Default for SearchIndex {
    fn default() -> Self {
        Self {
            version: INDEX_VERSION,
            scheme: WeightScheme::default(),
            max_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            postings: HashMap::new(),
            documents: HashMap::new(),
        }
    }
}

/// Cache file for the index inside the data directory
pub fn get_index_path(data_dir: &Path) -> PathBuf {
    data_dir.join("search_index.bin")
}

/// Load index from disk. `None` when missing, unreadable, from another
/// format version or built by a differently configured normalizer, in which
/// case the caller rebuilds.
pub fn load_index(path: &Path, normalizer: &Normalizer) -> Option<SearchIndex> {
    let file = fs::File::open(path).ok()?;
    let reader = BufReader::new(file);
    let index: SearchIndex = match bincode::deserialize_from(reader) {
        Ok(index) => index,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "discarding unreadable search index");
            return None;
        }
    };

    if index.version != INDEX_VERSION {
        info!(found = index.version, expected = INDEX_VERSION, "search index version changed");
        return None;
    }
    if !index.built_with(normalizer) {
        info!(
            found = ?index.scheme,
            expected = ?normalizer.scheme(),
            "search index built with other normalizer settings"
        );
        return None;
    }
    Some(index)
}

/// Save index to disk
pub fn save_index(index: &SearchIndex, path: &Path) -> CardResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path)?;
    let writer = BufWriter::new(file);
    bincode::serialize_into(writer, index)?;
    Ok(())
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty index tagged with the settings of `normalizer`.
    pub fn for_normalizer(normalizer: &Normalizer) -> Self {
        Self {
            scheme: normalizer.scheme(),
            max_bytes: normalizer.max_bytes(),
            ..Self::default()
        }
    }

    /// Whether the postings were computed the way `normalizer` computes them
    pub fn built_with(&self, normalizer: &Normalizer) -> bool {
        self.scheme == normalizer.scheme() && self.max_bytes == normalizer.max_bytes()
    }

    pub fn scheme(&self) -> WeightScheme {
        self.scheme
    }

    /// Record `vector` as the contribution of `id`. Whatever `id` contributed
    /// before is purged first, so tokens that vanished from the text stop
    /// matching.
    pub fn add_to_index(&mut self, id: &str, vector: &TermVector) {
        self.remove_card(id);

        for (token, weight) in vector.iter() {
            self.postings
                .entry(token.clone())
                .or_default()
                .insert(id.to_string(), weight);
        }
        if !vector.is_empty() {
            self.documents
                .insert(id.to_string(), vector.tokens().cloned().collect());
        }
        debug!(id, tokens = vector.len(), "indexed card");
    }

    /// Delete the postings of `id` for every token in `vector`. Tokens or IDs
    /// that are not present are skipped.
    pub fn remove_from_index(&mut self, id: &str, vector: &TermVector) {
        for token in vector.tokens() {
            self.remove_posting(token, id);
        }
        if let Some(tokens) = self.documents.get_mut(id) {
            tokens.retain(|token| vector.get(token).is_none());
            if tokens.is_empty() {
                self.documents.remove(id);
            }
        }
    }

    /// Drop every posting held by `id`.
    pub fn remove_card(&mut self, id: &str) {
        if let Some(tokens) = self.documents.remove(id) {
            for token in &tokens {
                self.remove_posting(token, id);
            }
        }
    }

    fn remove_posting(&mut self, token: &str, id: &str) {
        if let Some(posting) = self.postings.get_mut(token) {
            posting.remove(id);
            if posting.is_empty() {
                self.postings.remove(token);
            }
        }
    }

    pub fn posting(&self, token: &str) -> Option<&HashMap<CardId, f64>> {
        self.postings.get(token)
    }

    pub fn weight(&self, token: &str, id: &str) -> Option<f64> {
        self.postings.get(token)?.get(id).copied()
    }

    pub fn contains_card(&self, id: &str) -> bool {
        self.documents.contains_key(id)
    }

    /// Number of distinct tokens
    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Index every note in `store` from scratch. Notes whose text cannot be
    /// normalized are skipped and reported in the returned list.
    pub fn rebuild(&mut self, store: &CardStore, normalizer: &Normalizer) -> Vec<CardId> {
        self.postings.clear();
        self.documents.clear();
        self.scheme = normalizer.scheme();
        self.max_bytes = normalizer.max_bytes();

        let mut failed = Vec::new();
        for (id, note) in store.notes() {
            match normalizer.features(&note.contents) {
                Ok(vector) => self.add_to_index(id, &vector),
                Err(e) => {
                    warn!(id = %id, error = %e, "skipping note during rebuild");
                    failed.push(id.clone());
                }
            }
        }
        info!(
            documents = self.documents.len(),
            tokens = self.postings.len(),
            "rebuilt search index"
        );
        failed
    }
}
