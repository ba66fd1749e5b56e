//! Hybrid retrieval: BM25 and vector search fused into one ranking.
//!
//! Each side over-fetches `k * overfetch` candidates. Scores are min-max
//! normalized per side over this call's candidates, then combined as
//!
//! ```text
//! fused = semantic_weight * semantic + (1 - semantic_weight) * lexical
//! ```
//!
//! A candidate missing from one side scores 0 on that side. At weight 0
//! the vector side (and the query embedding) is skipped entirely; at
//! weight 1 the lexical side is skipped.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::embedding::Embedder;
use crate::error::{EngineError, Result};
use crate::lexical_index::LexicalIndex;
use crate::models::{ChunkId, RetrievalResult};
use crate::vector_index::VectorIndex;

/// Reject queries with no non-whitespace characters.
pub fn validate_query(query: &str) -> Result<()> {
    if query.trim().is_empty() {
        return Err(EngineError::InvalidQuery("query is empty".into()));
    }
    Ok(())
}

pub fn validate_weight(semantic_weight: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&semantic_weight) {
        return Err(EngineError::InvalidQuery(format!(
            "semantic_weight must be within [0, 1], got {}",
            semantic_weight
        )));
    }
    Ok(())
}

pub struct HybridRetriever {
    embedder: Arc<dyn Embedder>,
    vectors: Arc<VectorIndex>,
    lexical: Arc<LexicalIndex>,
    overfetch: usize,
}

impl HybridRetriever {
    /// Fails when the embedder does not produce vectors for `vectors`.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vectors: Arc<VectorIndex>,
        lexical: Arc<LexicalIndex>,
        overfetch: usize,
    ) -> Result<Self> {
        if embedder.dims() != vectors.dims() {
            return Err(EngineError::DimensionMismatch {
                expected: vectors.dims(),
                actual: embedder.dims(),
            });
        }
        if embedder.model_id() != vectors.model_id() {
            return Err(EngineError::IndexCorrupt(format!(
                "vector index holds model {} but embedder is {}",
                vectors.model_id(),
                embedder.model_id()
            )));
        }
        Ok(Self {
            embedder,
            vectors,
            lexical,
            overfetch: overfetch.max(1),
        })
    }

    /// Top `k` chunks for `query`, ordered by fused score.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        semantic_weight: f64,
    ) -> Result<Vec<RetrievalResult>> {
        validate_query(query)?;
        validate_weight(semantic_weight)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let fetch = k.saturating_mul(self.overfetch);

        let lexical = if semantic_weight < 1.0 {
            self.lexical.search(query, fetch)
        } else {
            Vec::new()
        };
        let semantic = if semantic_weight > 0.0 {
            let q = self.embedder.embed(query).await?;
            self.vectors
                .search(&q, fetch)?
                .into_iter()
                .map(|(id, sim)| (id, sim as f64))
                .collect()
        } else {
            Vec::new()
        };

        debug!(
            lexical = lexical.len(),
            semantic = semantic.len(),
            semantic_weight,
            "retrieved candidates"
        );
        Ok(fuse(&lexical, &semantic, semantic_weight, k))
    }
}

/// Min-max normalize scores into `[0, 1]`; equal scores all map to 1.0.
pub fn normalize_scores(scores: &[(ChunkId, f64)]) -> Vec<(ChunkId, f64)> {
    if scores.is_empty() {
        return Vec::new();
    }

    let s_min = scores.iter().map(|s| s.1).fold(f64::INFINITY, f64::min);
    let s_max = scores.iter().map(|s| s.1).fold(f64::NEG_INFINITY, f64::max);

    scores
        .iter()
        .map(|&(id, raw)| {
            let norm = if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (raw - s_min) / (s_max - s_min)
            };
            (id, norm)
        })
        .collect()
}

#[derive(Default)]
struct Candidate {
    lexical_raw: Option<f64>,
    lexical_norm: f64,
    lexical_rank: Option<usize>,
    semantic_raw: Option<f64>,
    semantic_norm: f64,
    semantic_rank: Option<usize>,
}

/// Fuse per-side candidate lists into at most `k` results, ordered by
/// fused score descending.
///
/// Equal fused scores keep the order of the dominant side's list (the
/// semantic list when `semantic_weight >= 0.5`), falling back to the other
/// list's order and then to ascending chunk id.
pub fn fuse(
    lexical: &[(ChunkId, f64)],
    semantic: &[(ChunkId, f64)],
    semantic_weight: f64,
    k: usize,
) -> Vec<RetrievalResult> {
    let mut candidates: BTreeMap<ChunkId, Candidate> = BTreeMap::new();
    let lexical_norms = normalize_scores(lexical);
    for (rank, ((id, raw), (_, norm))) in lexical.iter().zip(lexical_norms).enumerate() {
        let c = candidates.entry(*id).or_default();
        c.lexical_raw = Some(*raw);
        c.lexical_norm = norm;
        c.lexical_rank.get_or_insert(rank);
    }
    let semantic_norms = normalize_scores(semantic);
    for (rank, ((id, raw), (_, norm))) in semantic.iter().zip(semantic_norms).enumerate() {
        let c = candidates.entry(*id).or_default();
        c.semantic_raw = Some(*raw);
        c.semantic_norm = norm;
        c.semantic_rank.get_or_insert(rank);
    }

    let semantic_first = semantic_weight >= 0.5;
    let mut ranked: Vec<(usize, RetrievalResult)> = candidates
        .into_iter()
        .map(|(chunk_id, c)| {
            let fused = semantic_weight * c.semantic_norm + (1.0 - semantic_weight) * c.lexical_norm;
            let rank = if semantic_first {
                c.semantic_rank.or(c.lexical_rank)
            } else {
                c.lexical_rank.or(c.semantic_rank)
            };
            let result = RetrievalResult {
                chunk_id,
                lexical_score: c.lexical_raw,
                semantic_score: c.semantic_raw,
                fused_score: fused.clamp(0.0, 1.0),
            };
            (rank.unwrap_or(usize::MAX), result)
        })
        .collect();

    ranked.sort_by(|(ra, a), (rb, b)| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(Ordering::Equal)
            .then(ra.cmp(rb))
            .then(a.chunk_id.cmp(&b.chunk_id))
    });
    ranked.truncate(k);
    ranked.into_iter().map(|(_, r)| r).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LexicalConfig;
    use crate::embedding::HashingEmbedder;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use uuid::Uuid;

    fn id(n: u128) -> ChunkId {
        Uuid::from_u128(n)
    }

    #[test]
    fn normalize_maps_to_unit_range() {
        let out = normalize_scores(&[(id(1), 2.0), (id(2), 4.0), (id(3), 3.0)]);
        assert_eq!(out[0].1, 0.0);
        assert_eq!(out[1].1, 1.0);
        assert!((out[2].1 - 0.5).abs() < 1e-9);
    }

    #[test]
    fn normalize_equal_scores_are_one() {
        let out = normalize_scores(&[(id(1), 0.3), (id(2), 0.3)]);
        assert!(out.iter().all(|(_, s)| *s == 1.0));
    }

    #[test]
    fn fused_scores_stay_in_unit_range() {
        let lexical = vec![(id(1), 12.0), (id(2), 3.5), (id(3), 0.1)];
        let semantic = vec![(id(3), 0.9), (id(4), -0.4), (id(1), 0.2)];
        for w in [0.0, 0.3, 0.7, 1.0] {
            for r in fuse(&lexical, &semantic, w, 10) {
                assert!((0.0..=1.0).contains(&r.fused_score), "{:?}", r);
            }
        }
    }

    #[test]
    fn missing_side_counts_as_zero() {
        let lexical = vec![(id(1), 5.0), (id(2), 1.0)];
        let semantic = vec![(id(3), 0.8), (id(2), 0.1)];
        let out = fuse(&lexical, &semantic, 0.5, 10);
        let only_lexical = out.iter().find(|r| r.chunk_id == id(1)).unwrap();
        assert_eq!(only_lexical.semantic_score, None);
        assert!((only_lexical.fused_score - 0.5).abs() < 1e-9);
        let only_semantic = out.iter().find(|r| r.chunk_id == id(3)).unwrap();
        assert_eq!(only_semantic.lexical_score, None);
        assert!((only_semantic.fused_score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn ties_keep_list_order_and_truncate() {
        let lexical = vec![(id(9), 1.0), (id(4), 1.0), (id(7), 1.0)];
        let out = fuse(&lexical, &[], 0.0, 2);
        let ids: Vec<_> = out.iter().map(|r| r.chunk_id).collect();
        assert_eq!(ids, vec![id(9), id(4)]);

        let semantic = vec![(id(8), 0.9), (id(2), 0.9)];
        let ids: Vec<_> = fuse(&[], &semantic, 1.0, 5)
            .into_iter()
            .map(|r| r.chunk_id)
            .collect();
        assert_eq!(ids, vec![id(8), id(2)]);
    }

    #[test]
    fn weight_zero_follows_lexical_order() {
        let lexical = vec![(id(5), 9.0), (id(1), 4.0), (id(3), 2.0)];
        let semantic = vec![(id(3), 1.0), (id(1), 0.5)];
        let ids: Vec<_> = fuse(&lexical, &semantic, 0.0, 3)
            .into_iter()
            .map(|r| r.chunk_id)
            .collect();
        assert_eq!(ids, vec![id(5), id(1), id(3)]);
    }

    struct CountingEmbedder {
        inner: HashingEmbedder,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_id(&self) -> &str {
            self.inner.model_id()
        }
        fn dims(&self) -> usize {
            self.inner.dims()
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            self.inner.embed_batch(texts).await
        }
    }

    fn setup() -> (Arc<CountingEmbedder>, HybridRetriever) {
        let (embedder, _, _, retriever) = setup_with_indexes();
        (embedder, retriever)
    }

    fn setup_with_indexes() -> (
        Arc<CountingEmbedder>,
        Arc<VectorIndex>,
        Arc<LexicalIndex>,
        HybridRetriever,
    ) {
        let embedder = Arc::new(CountingEmbedder {
            inner: HashingEmbedder::new(32),
            calls: AtomicUsize::new(0),
        });
        let vectors = Arc::new(VectorIndex::new(embedder.model_id(), 32, 2, 2));
        let lexical = Arc::new(LexicalIndex::from_config(&LexicalConfig::default()));
        let retriever =
            HybridRetriever::new(embedder.clone(), vectors.clone(), lexical.clone(), 4).unwrap();
        (embedder, vectors, lexical, retriever)
    }

    #[tokio::test]
    async fn weight_one_matches_vector_index_order() {
        let (embedder, vectors, _, retriever) = setup_with_indexes();
        let shared = embedder.embed("lighthouse keeper").await.unwrap();
        vectors.upsert(id(9), &shared).unwrap();
        vectors.upsert(id(1), &shared).unwrap();
        let other = embedder.embed("orchard harvest").await.unwrap();
        vectors.upsert(id(5), &other).unwrap();

        let query = embedder.embed("lighthouse keeper").await.unwrap();
        let expected: Vec<ChunkId> = vectors
            .search(&query, 3)
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(&expected[..2], &[id(9), id(1)]);

        let got: Vec<ChunkId> = retriever
            .retrieve("lighthouse keeper", 3, 1.0)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.chunk_id)
            .collect();
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn weight_zero_matches_lexical_index_order() {
        let (_, _, lexical, retriever) = setup_with_indexes();
        lexical.upsert(id(6), "tide tables for the harbor");
        lexical.upsert(id(2), "tide tables for the harbor");
        lexical.upsert(id(4), "harbor");

        let expected: Vec<ChunkId> = lexical
            .search("harbor tide", 3)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        let got: Vec<ChunkId> = retriever
            .retrieve("harbor tide", 3, 0.0)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.chunk_id)
            .collect();
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn weight_zero_never_embeds() {
        let (embedder, retriever) = setup();
        retriever.retrieve("anything", 5, 0.0).await.unwrap();
        assert_eq!(embedder.calls.load(AtomicOrdering::SeqCst), 0);
        retriever.retrieve("anything", 5, 0.5).await.unwrap();
        assert_eq!(embedder.calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn blank_query_and_bad_weight_are_invalid() {
        let (embedder, retriever) = setup();
        let err = retriever.retrieve("  \n", 5, 0.5).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_query");
        let err = retriever.retrieve("ok", 5, 1.5).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_query");
        let err = retriever.retrieve("ok", 5, f64::NAN).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_query");
        assert_eq!(embedder.calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn model_mismatch_is_rejected() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(32));
        let vectors = Arc::new(VectorIndex::new("other-model", 32, 1, 1));
        let lexical = Arc::new(LexicalIndex::from_config(&LexicalConfig::default()));
        assert!(HybridRetriever::new(embedder.clone(), vectors, lexical.clone(), 2).is_err());
        let narrow = Arc::new(VectorIndex::new(embedder.model_id(), 16, 1, 1));
        let err = HybridRetriever::new(embedder, narrow, lexical, 2).err().map(|e| e.kind());
        assert_eq!(err, Some("dimension_mismatch"));
    }
}
