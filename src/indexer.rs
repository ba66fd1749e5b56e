//! Write path: normalize, store, embed, and index documents.
//!
//! Every chunk goes to the relational store before either index sees it,
//! so [`Indexer::rebuild`] can always reconstruct both indexes from the
//! store alone. Deletes tombstone in the store first and return only after
//! both indexes have dropped the chunk.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::embedding::EmbeddingPool;
use crate::error::{EngineError, ErrorBody, Result};
use crate::lexical_index::LexicalIndex;
use crate::models::{Chunk, ChunkId, Document, DocumentId, Embedding};
use crate::normalize::Normalizer;
use crate::store::ChunkStore;
use crate::vector_index::VectorIndex;

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub document_id: DocumentId,
    pub source: String,
    pub chunks: usize,
    /// The source was already stored with identical content.
    pub unchanged: bool,
    /// Previous version of the same source, now tombstoned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded: Option<DocumentId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectedDocument {
    pub source: String,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub ingested: Vec<IngestReport>,
    pub rejected: Vec<RejectedDocument>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RebuildReport {
    pub chunks: usize,
    pub reused_embeddings: usize,
    pub reembedded: usize,
    pub partitions: usize,
}

pub struct Indexer {
    normalizer: Normalizer,
    pool: EmbeddingPool,
    store: Arc<dyn ChunkStore>,
    vectors: Arc<VectorIndex>,
    lexical: Arc<LexicalIndex>,
}

impl Indexer {
    pub fn new(
        normalizer: Normalizer,
        pool: EmbeddingPool,
        store: Arc<dyn ChunkStore>,
        vectors: Arc<VectorIndex>,
        lexical: Arc<LexicalIndex>,
    ) -> Self {
        Self {
            normalizer,
            pool,
            store,
            vectors,
            lexical,
        }
    }

    fn model_id(&self) -> &str {
        self.pool.embedder().model_id()
    }

    /// Ingest one document. Re-ingesting a source with identical content is
    /// a no-op; new content supersedes the previous version.
    pub async fn ingest(&self, doc: Document) -> Result<IngestReport> {
        let mut chunks = self.normalizer.normalize(&doc)?;

        let previous = self.store.latest_version(&doc.source).await?;
        if let Some(prev) = previous.as_ref().filter(|p| p.content_hash == doc.content_hash()) {
            debug!(source = %doc.source, "content unchanged, skipping");
            return Ok(IngestReport {
                document_id: prev.id,
                source: doc.source,
                chunks: prev.live_chunks,
                unchanged: true,
                superseded: None,
            });
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.pool.embed_all(texts).await?;
        let model = self.model_id().to_string();
        for (chunk, vector) in chunks.iter_mut().zip(vectors) {
            chunk.embedding = Some(Embedding {
                model: model.clone(),
                vector,
            });
        }

        self.store.upsert_document(&doc).await?;
        self.store.upsert_chunks(&chunks).await?;
        self.index_chunks(&chunks)?;

        let superseded = match previous {
            Some(prev) => {
                let removed = self.store.tombstone_document(&prev.id).await?;
                self.unindex(&removed);
                Some(prev.id)
            }
            None => None,
        };

        info!(
            source = %doc.source,
            chunks = chunks.len(),
            superseded = superseded.is_some(),
            "ingested document"
        );
        Ok(IngestReport {
            document_id: doc.id,
            source: doc.source,
            chunks: chunks.len(),
            unchanged: false,
            superseded,
        })
    }

    /// Ingest documents one by one. Unreadable documents are reported and
    /// skipped; any other failure aborts the batch.
    pub async fn ingest_all(&self, docs: Vec<Document>) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        for doc in docs {
            let source = doc.source.clone();
            match self.ingest(doc).await {
                Ok(r) => report.ingested.push(r),
                Err(
                    e @ (EngineError::UnsupportedFormat { .. }
                    | EngineError::Extraction(_)
                    | EngineError::EmptyInput),
                ) => {
                    warn!(source = %source, error = %e, "rejected document");
                    report.rejected.push(RejectedDocument {
                        source,
                        error: e.to_body(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    /// Delete one chunk; returns whether it was live.
    pub async fn delete_chunk(&self, id: &ChunkId) -> Result<bool> {
        let tombstoned = self.store.tombstone_chunk(id).await?;
        self.unindex(std::slice::from_ref(id));
        Ok(tombstoned)
    }

    /// Delete a document and all its chunks, returning the removed chunk ids.
    pub async fn delete_document(&self, id: &DocumentId) -> Result<Vec<ChunkId>> {
        let removed = self.store.tombstone_document(id).await?;
        self.unindex(&removed);
        info!(document = %id, chunks = removed.len(), "deleted document");
        Ok(removed)
    }

    /// Rebuild both indexes from the store's live chunks.
    ///
    /// Stored vectors pinned to the current model are reused; the rest are
    /// re-embedded and written back. Fresh indexes are filled and verified
    /// off to the side, then swapped in; on error the live indexes are left
    /// as they were.
    pub async fn rebuild(&self) -> Result<RebuildReport> {
        let mut chunks = self.store.live_chunks().await?;
        let model = self.model_id().to_string();
        let dims = self.vectors.dims();
        let stale: Vec<usize> = chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| {
                !c.embedding
                    .as_ref()
                    .is_some_and(|e| e.model == model && e.vector.len() == dims)
            })
            .map(|(i, _)| i)
            .collect();

        if !stale.is_empty() {
            let texts = stale.iter().map(|&i| chunks[i].text.clone()).collect();
            let vectors = self.pool.embed_all(texts).await?;
            for (&i, vector) in stale.iter().zip(vectors) {
                let embedding = Embedding {
                    model: model.clone(),
                    vector,
                };
                self.store.upsert_embedding(&chunks[i].id, &embedding).await?;
                chunks[i].embedding = Some(embedding);
            }
        }

        let vectors = self.vectors.empty_like();
        let lexical = self.lexical.empty_like();
        index_into(&vectors, &lexical, &chunks)?;
        vectors.rebuild_partitions();
        vectors.verify()?;
        lexical.verify()?;
        let partitions = vectors.stats().partitions;

        self.vectors.replace_with(vectors)?;
        self.lexical.replace_with(lexical);

        let report = RebuildReport {
            chunks: chunks.len(),
            reused_embeddings: chunks.len() - stale.len(),
            reembedded: stale.len(),
            partitions,
        };
        info!(
            chunks = report.chunks,
            reembedded = report.reembedded,
            model = %model,
            "rebuilt indexes"
        );
        Ok(report)
    }

    fn index_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        index_into(&self.vectors, &self.lexical, chunks)
    }

    fn unindex(&self, ids: &[ChunkId]) {
        for id in ids {
            self.vectors.remove(id);
            self.lexical.remove(id);
        }
    }
}

fn index_into(vectors: &VectorIndex, lexical: &LexicalIndex, chunks: &[Chunk]) -> Result<()> {
    for chunk in chunks {
        if let Some(embedding) = &chunk.embedding {
            vectors.upsert(chunk.id, &embedding.vector)?;
        }
        lexical.upsert(chunk.id, &chunk.text);
    }
    Ok(())
}
