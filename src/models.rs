//! Core data models used throughout the pipeline.
//!
//! [`Document`]s are ingested, split into [`Chunk`]s by the normalizer, and
//! indexed. [`RetrievalResult`] and [`Answer`] only live for the duration
//! of one query.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub type DocumentId = Uuid;
pub type ChunkId = Uuid;

/// An ingested unit of raw content.
///
/// Immutable once chunked: re-ingesting the same source creates a new
/// document (new id) and supersedes the previous version.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: DocumentId,
    /// URI-like locator, e.g. `file:///notes/a.md` or `mine://ideas/42`.
    pub source: String,
    /// Declared MIME type or extension. When absent the format is
    /// detected from the extension of `source`.
    pub content_type: Option<String>,
    pub content: Vec<u8>,
    pub metadata: BTreeMap<String, String>,
    pub ingested_at: DateTime<Utc>,
}

impl Document {
    pub fn new(source: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            content_type: None,
            content: content.into(),
            metadata: BTreeMap::new(),
            ingested_at: Utc::now(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// SHA-256 of the raw content, used to detect unchanged re-ingestion.
    pub fn content_hash(&self) -> String {
        sha256_hex(&self.content)
    }
}

/// An embedding vector pinned to the model that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub model: String,
    pub vector: Vec<f32>,
}

/// A contiguous span of a document's normalized text.
///
/// `start..end` are byte offsets into the document's extracted text and
/// `text` is exactly that slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,
}

/// One fused retrieval hit.
///
/// Component scores are the raw sub-index scores (BM25, cosine); `None`
/// when the chunk was not returned by that sub-index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub chunk_id: ChunkId,
    pub lexical_score: Option<f64>,
    pub semantic_score: Option<f64>,
    pub fused_score: f64,
}

/// A verbatim answer span. `start..end` are byte offsets within the chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub chunk_id: ChunkId,
    pub start: usize,
    pub end: usize,
    pub confidence: f64,
}

/// Chunk-level provenance used for citations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRef {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub score: f64,
    pub preview: String,
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_ignores_identity() {
        let a = Document::new("mine://a", "same body");
        let b = Document::new("mine://b", "same body");
        assert_ne!(a.id, b.id);
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn builder_sets_fields() {
        let doc = Document::new("mine://ideas/1", "x")
            .with_content_type("text/markdown")
            .with_metadata("label", "ideas");
        assert_eq!(doc.content_type.as_deref(), Some("text/markdown"));
        assert_eq!(doc.metadata.get("label").map(String::as_str), Some("ideas"));
    }
}
