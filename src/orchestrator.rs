//! Question answering end to end: retrieve, read, and shape the response.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{EngineError, ErrorBody, Result};
use crate::models::{Answer, ChunkId, DocumentId, RetrievalResult, SourceRef};
use crate::reader::Reader;
use crate::retriever::{validate_query, validate_weight, HybridRetriever};
use crate::store::ChunkStore;

#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub max_answers: Option<usize>,
    #[serde(default)]
    pub semantic_weight: Option<f64>,
}

impl AskRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            top_k: None,
            max_answers: None,
            semantic_weight: None,
        }
    }
}

/// Set when retrieval succeeded but a later stage failed.
#[derive(Debug, Clone, Serialize)]
pub struct Degraded {
    pub stage: String,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct QaResponse {
    pub question: String,
    pub answers: Vec<Answer>,
    pub retrieved_count: usize,
    pub sources: Vec<SourceRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<Degraded>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub score: f64,
    pub lexical_score: Option<f64>,
    pub semantic_score: Option<f64>,
    pub preview: String,
}

#[derive(Debug, Clone)]
pub struct QaDefaults {
    pub semantic_weight: f64,
    pub top_k: usize,
    pub max_answers: usize,
    pub search_limit: usize,
    pub preview_chars: usize,
}

impl Default for QaDefaults {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for QaDefaults {
    fn from(config: &Config) -> Self {
        Self {
            semantic_weight: config.retrieval.semantic_weight,
            top_k: config.retrieval.top_k,
            max_answers: config.reader.max_answers,
            search_limit: config.retrieval.search_limit,
            preview_chars: config.reader.preview_chars,
        }
    }
}

pub struct QaOrchestrator {
    retriever: Arc<HybridRetriever>,
    reader: Arc<dyn Reader>,
    store: Arc<dyn ChunkStore>,
    defaults: QaDefaults,
}

impl QaOrchestrator {
    pub fn new(
        retriever: Arc<HybridRetriever>,
        reader: Arc<dyn Reader>,
        store: Arc<dyn ChunkStore>,
        defaults: QaDefaults,
    ) -> Self {
        Self {
            retriever,
            reader,
            store,
            defaults,
        }
    }

    pub fn defaults(&self) -> &QaDefaults {
        &self.defaults
    }

    pub async fn ask(&self, request: AskRequest) -> Result<QaResponse> {
        self.ask_until(request, std::future::pending()).await
    }

    /// Like [`ask`](Self::ask), but abandoned with `Cancelled` as soon as
    /// `cancel` resolves. No partial response is returned.
    pub async fn ask_until<C>(&self, request: AskRequest, cancel: C) -> Result<QaResponse>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = cancel => {
                debug!(question = %request.question, "ask cancelled");
                Err(EngineError::Cancelled)
            }
            response = self.answer(&request) => response,
        }
    }

    async fn answer(&self, request: &AskRequest) -> Result<QaResponse> {
        let question = request.question.as_str();
        validate_query(question)?;
        let weight = request.semantic_weight.unwrap_or(self.defaults.semantic_weight);
        validate_weight(weight)?;
        let top_k = request.top_k.unwrap_or(self.defaults.top_k);
        let max_answers = request.max_answers.unwrap_or(self.defaults.max_answers);

        let retrieved = self.retriever.retrieve(question, top_k, weight).await?;
        let ids: Vec<ChunkId> = retrieved.iter().map(|r| r.chunk_id).collect();
        let chunks = self.store.get_chunks(&ids).await?;

        let (answers, degraded) = match self.reader.read(question, &chunks, max_answers).await {
            Ok(answers) => (answers, None),
            Err(e) => {
                warn!(error = %e, "answer extraction failed; returning retrieval only");
                let degraded = Degraded {
                    stage: "extraction".to_string(),
                    error: e.to_body(),
                };
                (Vec::new(), Some(degraded))
            }
        };

        let scores: HashMap<ChunkId, f64> =
            retrieved.iter().map(|r| (r.chunk_id, r.fused_score)).collect();
        let order = answers
            .iter()
            .map(|a| a.chunk_id)
            .chain(chunks.iter().map(|c| c.id));
        let mut seen = HashSet::new();
        let sources = order
            .filter(|id| seen.insert(*id))
            .filter_map(|id| chunks.iter().find(|c| c.id == id))
            .map(|c| SourceRef {
                chunk_id: c.id,
                document_id: c.document_id,
                score: scores.get(&c.id).copied().unwrap_or(0.0),
                preview: preview(&c.text, self.defaults.preview_chars),
            })
            .collect();

        Ok(QaResponse {
            question: question.to_string(),
            answers,
            retrieved_count: chunks.len(),
            sources,
            degraded,
        })
    }

    /// Ranked chunks for `query` with previews.
    pub async fn search(
        &self,
        query: &str,
        limit: Option<usize>,
        semantic_weight: Option<f64>,
    ) -> Result<Vec<SearchHit>> {
        let weight = semantic_weight.unwrap_or(self.defaults.semantic_weight);
        let limit = limit.unwrap_or(self.defaults.search_limit);
        let retrieved = self.retriever.retrieve(query, limit, weight).await?;
        self.hits(retrieved).await
    }

    /// Retrieval only, with the default weight: provenance for the `k`
    /// closest chunks.
    pub async fn similar(&self, query: &str, k: usize) -> Result<Vec<SourceRef>> {
        let retrieved = self
            .retriever
            .retrieve(query, k, self.defaults.semantic_weight)
            .await?;
        Ok(self
            .hits(retrieved)
            .await?
            .into_iter()
            .map(|h| SourceRef {
                chunk_id: h.chunk_id,
                document_id: h.document_id,
                score: h.score,
                preview: h.preview,
            })
            .collect())
    }

    async fn hits(&self, retrieved: Vec<RetrievalResult>) -> Result<Vec<SearchHit>> {
        let ids: Vec<ChunkId> = retrieved.iter().map(|r| r.chunk_id).collect();
        let chunks = self.store.get_chunks(&ids).await?;
        let by_id: HashMap<ChunkId, _> = chunks.iter().map(|c| (c.id, c)).collect();
        Ok(retrieved
            .into_iter()
            .filter_map(|r| {
                let chunk = by_id.get(&r.chunk_id)?;
                Some(SearchHit {
                    chunk_id: r.chunk_id,
                    document_id: chunk.document_id,
                    score: r.fused_score,
                    lexical_score: r.lexical_score,
                    semantic_score: r.semantic_score,
                    preview: preview(&chunk.text, self.defaults.preview_chars),
                })
            })
            .collect())
    }
}

/// First `max_chars` characters of `text`, with `...` when truncated.
pub fn preview(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_on_char_boundary() {
        assert_eq!(preview("short", 200), "short");
        assert_eq!(preview("héllo world", 5), "héllo...");
        assert_eq!(preview("  padded  ", 10), "padded");
    }

    #[test]
    fn ask_request_defaults_optional_fields() {
        let req: AskRequest = serde_json::from_str(r#"{"question":"why?"}"#).unwrap();
        assert_eq!(req.question, "why?");
        assert!(req.top_k.is_none() && req.semantic_weight.is_none());
    }
}
