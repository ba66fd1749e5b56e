//! BM25 keyword index over chunk text.
//!
//! Postings map each term to the chunks containing it with their term
//! frequency. Removing a chunk drops its postings immediately and deletes
//! terms left without postings.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use crate::config::LexicalConfig;
use crate::error::{EngineError, Result};
use crate::models::ChunkId;
use crate::tokenize::{SimpleTokenizer, Tokenizer};

#[derive(Debug)]
struct DocEntry {
    len: u32,
    /// Distinct terms with their frequency in this chunk.
    terms: HashMap<String, u32>,
}

#[derive(Debug, Default)]
struct LexicalState {
    docs: HashMap<ChunkId, DocEntry>,
    postings: HashMap<String, BTreeMap<ChunkId, u32>>,
    total_len: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LexicalIndexStats {
    pub chunks: usize,
    pub terms: usize,
    pub avg_len: f64,
}

pub struct LexicalIndex {
    tokenizer: Arc<dyn Tokenizer>,
    k1: f64,
    b: f64,
    state: RwLock<LexicalState>,
}

impl LexicalIndex {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self {
            tokenizer,
            k1: 1.2,
            b: 0.75,
            state: RwLock::new(LexicalState::default()),
        }
    }

    pub fn from_config(config: &LexicalConfig) -> Self {
        let tokenizer = if config.stopwords {
            SimpleTokenizer::without_stopwords()
        } else {
            SimpleTokenizer::new()
        };
        let mut index = Self::new(Arc::new(tokenizer));
        index.k1 = config.k1;
        index.b = config.b;
        index
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, LexicalState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, LexicalState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Index `text` under `id`, replacing any previous postings for `id`.
    pub fn upsert(&self, id: ChunkId, text: &str) {
        let terms = self.tokenizer.terms(text);
        let len = terms.len() as u32;
        let mut freqs: HashMap<String, u32> = HashMap::new();
        for term in terms {
            *freqs.entry(term).or_insert(0) += 1;
        }

        let mut guard = self.write();
        let state = &mut *guard;
        detach(state, &id);
        for (term, tf) in &freqs {
            state
                .postings
                .entry(term.clone())
                .or_default()
                .insert(id, *tf);
        }
        state.total_len += len as u64;
        state.docs.insert(id, DocEntry { len, terms: freqs });
    }

    /// Remove `id` and its postings; returns whether it was present.
    pub fn remove(&self, id: &ChunkId) -> bool {
        let mut guard = self.write();
        detach(&mut guard, id)
    }

    pub fn contains(&self, id: &ChunkId) -> bool {
        self.read().docs.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.read().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Top `k` chunks by BM25, highest first; ties by ascending id.
    ///
    /// Only chunks containing at least one query term are returned.
    pub fn search(&self, query: &str, k: usize) -> Vec<(ChunkId, f64)> {
        let mut query_terms = self.tokenizer.terms(query);
        query_terms.sort();
        query_terms.dedup();

        let state = self.read();
        if k == 0 || state.docs.is_empty() || query_terms.is_empty() {
            return Vec::new();
        }
        let n = state.docs.len() as f64;
        let avg_len = (state.total_len as f64 / n).max(1.0);

        let mut scores: HashMap<ChunkId, f64> = HashMap::new();
        for term in &query_terms {
            let Some(posting) = state.postings.get(term) else {
                continue;
            };
            let df = posting.len() as f64;
            let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
            for (id, &tf) in posting {
                let len = state.docs.get(id).map_or(0, |d| d.len) as f64;
                let tf = tf as f64;
                let norm = tf * (self.k1 + 1.0)
                    / (tf + self.k1 * (1.0 - self.b + self.b * len / avg_len));
                *scores.entry(*id).or_insert(0.0) += idf * norm;
            }
        }

        let mut ranked: Vec<(ChunkId, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        ranked.truncate(k);
        ranked
    }

    /// Check that postings and per-chunk term tables agree.
    pub fn verify(&self) -> Result<()> {
        let state = self.read();
        let mut total_len = 0u64;
        for (id, doc) in &state.docs {
            total_len += doc.len as u64;
            for (term, tf) in &doc.terms {
                match state.postings.get(term).and_then(|p| p.get(id)) {
                    Some(found) if found == tf => {}
                    _ => {
                        return Err(EngineError::IndexCorrupt(format!(
                            "chunk {} missing posting for term {:?}",
                            id, term
                        )))
                    }
                }
            }
        }
        for (term, posting) in &state.postings {
            if posting.is_empty() {
                return Err(EngineError::IndexCorrupt(format!(
                    "empty posting list for term {:?}",
                    term
                )));
            }
            if let Some(id) = posting.keys().find(|id| !state.docs.contains_key(*id)) {
                return Err(EngineError::IndexCorrupt(format!(
                    "term {:?} references removed chunk {}",
                    term, id
                )));
            }
        }
        if total_len != state.total_len {
            return Err(EngineError::IndexCorrupt(format!(
                "length total {} does not match {}",
                state.total_len, total_len
            )));
        }
        Ok(())
    }

    pub fn stats(&self) -> LexicalIndexStats {
        let state = self.read();
        let chunks = state.docs.len();
        LexicalIndexStats {
            chunks,
            terms: state.postings.len(),
            avg_len: if chunks == 0 {
                0.0
            } else {
                state.total_len as f64 / chunks as f64
            },
        }
    }

    /// An empty index with the same tokenizer and BM25 parameters.
    pub fn empty_like(&self) -> Self {
        Self {
            tokenizer: self.tokenizer.clone(),
            k1: self.k1,
            b: self.b,
            state: RwLock::new(LexicalState::default()),
        }
    }

    /// Replace every posting with those of `other` in one write.
    pub fn replace_with(&self, other: LexicalIndex) {
        let fresh = other.state.into_inner().unwrap_or_else(PoisonError::into_inner);
        *self.write() = fresh;
    }
}

fn detach(state: &mut LexicalState, id: &ChunkId) -> bool {
    let Some(doc) = state.docs.remove(id) else {
        return false;
    };
    state.total_len -= doc.len as u64;
    for term in doc.terms.keys() {
        if let Some(posting) = state.postings.get_mut(term) {
            posting.remove(id);
            if posting.is_empty() {
                state.postings.remove(term);
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn index() -> LexicalIndex {
        LexicalIndex::from_config(&LexicalConfig::default())
    }

    #[test]
    fn replace_with_swaps_all_postings() {
        let idx = index();
        let old = Uuid::new_v4();
        idx.upsert(old, "harbor lights");
        let fresh = idx.empty_like();
        let new = Uuid::new_v4();
        fresh.upsert(new, "mountain pass");
        idx.replace_with(fresh);
        assert!(!idx.contains(&old));
        assert!(idx.contains(&new));
        assert!(idx.search("harbor", 5).is_empty());
        assert_eq!(idx.search("mountain", 5)[0].0, new);
    }

    #[test]
    fn ranks_matching_chunks() {
        let idx = index();
        let fox = Uuid::new_v4();
        let cat = Uuid::new_v4();
        idx.upsert(fox, "The quick brown fox jumps over the lazy dog.");
        idx.upsert(cat, "A cat sleeps all day.");
        let hits = idx.search("fox jumps", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, fox);
        assert!(hits[0].1 > 0.0);
    }

    #[test]
    fn unknown_terms_score_nothing() {
        let idx = index();
        idx.upsert(Uuid::new_v4(), "alpha beta");
        assert!(idx.search("gamma", 5).is_empty());
        assert!(idx.search("   ", 5).is_empty());
    }

    #[test]
    fn shorter_chunk_wins_for_same_tf() {
        let idx = index();
        let short = Uuid::new_v4();
        let long = Uuid::new_v4();
        idx.upsert(short, "rust compiler");
        idx.upsert(long, "rust compiler with many more unrelated words padding this chunk out");
        idx.upsert(Uuid::new_v4(), "nothing relevant");
        let hits = idx.search("rust", 10);
        assert_eq!(hits[0].0, short);
        assert_eq!(hits[1].0, long);
    }

    #[test]
    fn ties_break_by_chunk_id() {
        let idx = index();
        let low = Uuid::from_u128(1);
        let high = Uuid::from_u128(2);
        idx.upsert(high, "same words");
        idx.upsert(low, "same words");
        let hits = idx.search("words", 10);
        assert_eq!(hits[0].0, low);
        assert_eq!(hits[1].0, high);
    }

    #[test]
    fn remove_collects_postings() {
        let idx = index();
        let id = Uuid::new_v4();
        idx.upsert(id, "unique zebra term");
        idx.upsert(Uuid::new_v4(), "other words");
        assert!(idx.remove(&id));
        assert!(idx.search("zebra", 5).is_empty());
        assert_eq!(idx.stats().terms, 2);
        idx.verify().unwrap();
    }

    #[test]
    fn upsert_is_idempotent() {
        let idx = index();
        let a = Uuid::new_v4();
        idx.upsert(a, "repeat the text");
        idx.upsert(Uuid::new_v4(), "different text entirely");
        let before = idx.search("text repeat", 5);
        idx.upsert(a, "repeat the text");
        assert_eq!(idx.search("text repeat", 5), before);
        assert_eq!(idx.len(), 2);
        idx.verify().unwrap();
    }

    #[test]
    fn replacement_drops_old_terms() {
        let idx = index();
        let a = Uuid::new_v4();
        idx.upsert(a, "old content");
        idx.upsert(a, "new content");
        assert!(idx.search("old", 5).is_empty());
        assert_eq!(idx.search("new", 5)[0].0, a);
        idx.verify().unwrap();
    }
}
