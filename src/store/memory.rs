//! In-memory [`ChunkStore`] for tests and ephemeral pipelines.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Chunk, ChunkId, Document, DocumentId, Embedding};

use super::{ChunkStore, DocumentVersion};

struct StoredDoc {
    doc: Document,
    content_hash: String,
    seq: u64,
    deleted: bool,
}

struct StoredChunk {
    chunk: Chunk,
    deleted: bool,
}

#[derive(Default)]
struct Inner {
    docs: HashMap<DocumentId, StoredDoc>,
    chunks: HashMap<ChunkId, StoredChunk>,
    /// Chunk ids in first-insertion order.
    order: Vec<ChunkId>,
    next_seq: u64,
}

#[derive(Default)]
pub struct InMemoryChunkStore {
    inner: RwLock<Inner>,
}

impl InMemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn live(inner: &Inner, stored: &StoredChunk) -> bool {
    !stored.deleted
        && inner
            .docs
            .get(&stored.chunk.document_id)
            .is_some_and(|d| !d.deleted)
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    async fn upsert_document(&self, doc: &Document) -> Result<()> {
        let mut guard = self.write();
        let inner = &mut *guard;
        let seq = match inner.docs.get(&doc.id) {
            Some(existing) => existing.seq,
            None => {
                inner.next_seq += 1;
                inner.next_seq
            }
        };
        inner.docs.insert(
            doc.id,
            StoredDoc {
                doc: doc.clone(),
                content_hash: doc.content_hash(),
                seq,
                deleted: false,
            },
        );
        Ok(())
    }

    async fn get_document(&self, id: &DocumentId) -> Result<Option<Document>> {
        Ok(self
            .read()
            .docs
            .get(id)
            .filter(|d| !d.deleted)
            .map(|d| d.doc.clone()))
    }

    async fn latest_version(&self, source: &str) -> Result<Option<DocumentVersion>> {
        let inner = self.read();
        let latest = inner
            .docs
            .values()
            .filter(|d| !d.deleted && d.doc.source == source)
            .max_by_key(|d| (d.doc.ingested_at, d.seq));
        Ok(latest.map(|d| DocumentVersion {
            id: d.doc.id,
            content_hash: d.content_hash.clone(),
            live_chunks: inner
                .chunks
                .values()
                .filter(|c| !c.deleted && c.chunk.document_id == d.doc.id)
                .count(),
        }))
    }

    async fn upsert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut inner = self.write();
        for chunk in chunks {
            match inner.chunks.get_mut(&chunk.id) {
                Some(stored) => {
                    let embedding = chunk.embedding.clone().or(stored.chunk.embedding.take());
                    stored.chunk = Chunk {
                        embedding,
                        ..chunk.clone()
                    };
                }
                None => {
                    inner.order.push(chunk.id);
                    inner.chunks.insert(
                        chunk.id,
                        StoredChunk {
                            chunk: chunk.clone(),
                            deleted: false,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    async fn get_chunk(&self, id: &ChunkId) -> Result<Option<Chunk>> {
        let inner = self.read();
        Ok(inner
            .chunks
            .get(id)
            .filter(|c| live(&inner, c))
            .map(|c| c.chunk.clone()))
    }

    async fn get_chunks(&self, ids: &[ChunkId]) -> Result<Vec<Chunk>> {
        let inner = self.read();
        Ok(ids
            .iter()
            .filter_map(|id| inner.chunks.get(id))
            .filter(|c| live(&inner, c))
            .map(|c| c.chunk.clone())
            .collect())
    }

    async fn upsert_embedding(&self, chunk_id: &ChunkId, embedding: &Embedding) -> Result<()> {
        if let Some(stored) = self.write().chunks.get_mut(chunk_id) {
            stored.chunk.embedding = Some(embedding.clone());
        }
        Ok(())
    }

    async fn tombstone_chunk(&self, id: &ChunkId) -> Result<bool> {
        let mut inner = self.write();
        match inner.chunks.get_mut(id) {
            Some(stored) if !stored.deleted => {
                stored.deleted = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn tombstone_document(&self, id: &DocumentId) -> Result<Vec<ChunkId>> {
        let mut guard = self.write();
        let inner = &mut *guard;
        match inner.docs.get_mut(id) {
            Some(doc) if !doc.deleted => doc.deleted = true,
            _ => return Ok(Vec::new()),
        }
        let mut removed = Vec::new();
        for chunk_id in &inner.order {
            if let Some(stored) = inner.chunks.get_mut(chunk_id) {
                if stored.chunk.document_id == *id && !stored.deleted {
                    stored.deleted = true;
                    removed.push(*chunk_id);
                }
            }
        }
        Ok(removed)
    }

    async fn live_chunks(&self) -> Result<Vec<Chunk>> {
        let inner = self.read();
        Ok(inner
            .order
            .iter()
            .filter_map(|id| inner.chunks.get(id))
            .filter(|c| live(&inner, c))
            .map(|c| c.chunk.clone())
            .collect())
    }
}
