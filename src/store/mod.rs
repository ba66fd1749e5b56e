//! Relational store for documents, chunks, and pinned embeddings.
//!
//! The indexes are derived data; this store is the source they are rebuilt
//! from. Deletion is a tombstone: tombstoned documents and chunks are never
//! returned again, and the indexer removes them from both indexes.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`upsert_document`](ChunkStore::upsert_document) | Insert or update a document |
//! | [`latest_version`](ChunkStore::latest_version) | Newest live document for a source |
//! | [`upsert_chunks`](ChunkStore::upsert_chunks) | Bulk upsert, with embeddings when present |
//! | [`get_chunks`](ChunkStore::get_chunks) | Point lookups in input order |
//! | [`upsert_embedding`](ChunkStore::upsert_embedding) | Store a model-pinned vector |
//! | [`tombstone_chunk`](ChunkStore::tombstone_chunk) | Mark one chunk deleted |
//! | [`tombstone_document`](ChunkStore::tombstone_document) | Mark a document and its chunks deleted |
//! | [`live_chunks`](ChunkStore::live_chunks) | Every live chunk, in ingestion order |

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Chunk, ChunkId, Document, DocumentId, Embedding};

pub use memory::InMemoryChunkStore;
pub use sqlite::SqliteChunkStore;

/// The newest live document stored for a source.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentVersion {
    pub id: DocumentId,
    pub content_hash: String,
    pub live_chunks: usize,
}

#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn upsert_document(&self, doc: &Document) -> Result<()>;

    /// A live document by id; tombstoned documents are `None`.
    async fn get_document(&self, id: &DocumentId) -> Result<Option<Document>>;

    async fn latest_version(&self, source: &str) -> Result<Option<DocumentVersion>>;

    /// Insert or update chunks. Chunks carrying an embedding also store it.
    async fn upsert_chunks(&self, chunks: &[Chunk]) -> Result<()>;

    async fn get_chunk(&self, id: &ChunkId) -> Result<Option<Chunk>>;

    /// Live chunks among `ids`, in input order. Unknown and tombstoned ids
    /// are skipped.
    async fn get_chunks(&self, ids: &[ChunkId]) -> Result<Vec<Chunk>>;

    async fn upsert_embedding(&self, chunk_id: &ChunkId, embedding: &Embedding) -> Result<()>;

    /// Returns whether a live chunk was tombstoned.
    async fn tombstone_chunk(&self, id: &ChunkId) -> Result<bool>;

    /// Tombstone a document and its chunks, returning the chunk ids that
    /// were live.
    async fn tombstone_document(&self, id: &DocumentId) -> Result<Vec<ChunkId>>;

    async fn live_chunks(&self) -> Result<Vec<Chunk>>;
}
