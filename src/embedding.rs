//! Embedding providers and batched embedding.
//!
//! Defines the [`Embedder`] trait and its implementations:
//! - **[`HashingEmbedder`]**: deterministic feature hashing, no model files or network.
//! - **[`OpenAiEmbedder`]**: OpenAI-compatible `/v1/embeddings` API with retry and backoff.
//! - **`LocalEmbedder`**: fastembed ONNX models (feature `local-embeddings-fastembed`).
//!
//! Model loading is never done in a constructor. Callers run
//! [`Embedder::init`] once, which fails with `ModelUnavailable` when the
//! model cannot be loaded or reached.
//!
//! [`EmbeddingPool`] fans batches out to spawned tasks, bounded by a
//! semaphore, so ingestion never embeds on the request path.
//!
//! # Retry Strategy
//!
//! Only this module retries. Transient failures are retried with
//! exponential backoff (`base_delay * 2^attempt`, capped at 2^5):
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - Network errors and timeouts → retry
//! - Other HTTP 4xx → `ModelUnavailable`, no retry
//!
//! When retries are exhausted the failure surfaces as `ModelUnavailable`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::error::{EngineError, Result};
use crate::tokenize::{SimpleTokenizer, Tokenizer};

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier pinned next to every stored vector.
    fn model_id(&self) -> &str;

    fn dims(&self) -> usize;

    /// Load or verify the underlying model.
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Embed a batch of texts, returning vectors in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EngineError::EmptyInput);
        }
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| EngineError::ModelUnavailable("empty embedding response".into()))
    }
}

fn reject_blank(texts: &[String]) -> Result<()> {
    if texts.iter().any(|t| t.trim().is_empty()) {
        return Err(EngineError::EmptyInput);
    }
    Ok(())
}

// ============ Hashing Embedder ============

/// Signed feature hashing over unigrams, adjacent bigrams, and 4-char
/// prefixes, L2-normalized.
pub struct HashingEmbedder {
    model_id: String,
    dims: usize,
    tokenizer: SimpleTokenizer,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            model_id: format!("hashing-v1-{}", dims),
            dims: dims.max(1),
            tokenizer: SimpleTokenizer::new(),
        }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        let terms = self.tokenizer.terms(text);
        for term in &terms {
            self.add_feature(&mut v, term, 1.0);
            if term.chars().count() > 4 {
                let prefix: String = term.chars().take(4).collect();
                self.add_feature(&mut v, &format!("p:{}", prefix), 0.5);
            }
        }
        for pair in terms.windows(2) {
            self.add_feature(&mut v, &format!("{} {}", pair[0], pair[1]), 0.5);
        }
        normalize(&mut v);
        v
    }

    fn add_feature(&self, v: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bucket = [0u8; 8];
        bucket.copy_from_slice(&digest[..8]);
        let idx = (u64::from_le_bytes(bucket) % self.dims as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        v[idx] += sign * weight;
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        reject_blank(texts)?;
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }
}

// ============ Retry ============

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << attempt.min(5))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Run `op`, retrying transient failures per `policy`.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Err(err) if err.is_transient() => {
                if attempt >= policy.max_retries {
                    return Err(EngineError::ModelUnavailable(format!(
                        "giving up after {} attempts: {}",
                        attempt + 1,
                        err
                    )));
                }
                let delay = policy.delay_for(attempt);
                warn!(attempt = attempt + 1, ?delay, error = %err, "retrying embedding request");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

// ============ OpenAI Embedder ============

pub const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// Embedder backed by an OpenAI-compatible embeddings endpoint.
///
/// Reads `OPENAI_API_KEY` from the environment; [`Embedder::init`] fails
/// when it is missing.
pub struct OpenAiEmbedder {
    model: String,
    dims: usize,
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| "text-embedding-3-small".to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::ModelUnavailable(format!("http client: {}", e)))?;
        Ok(Self {
            model,
            dims: config.dims,
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| OPENAI_EMBEDDINGS_URL.to_string()),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            client,
            retry: RetryPolicy {
                max_retries: config.max_retries,
                base_delay: Duration::from_secs(1),
            },
        })
    }

    async fn request(&self, api_key: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let json: serde_json::Value = response
                .json()
                .await
                .map_err(|e| EngineError::Transient(e.to_string()))?;
            return parse_openai_response(&json);
        }

        let body_text = response.text().await.unwrap_or_default();
        if status.as_u16() == 429 || status.is_server_error() {
            Err(EngineError::Transient(format!("{}: {}", status, body_text)))
        } else {
            Err(EngineError::ModelUnavailable(format!(
                "embedding API error {}: {}",
                status, body_text
            )))
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn init(&self) -> Result<()> {
        match self.api_key {
            Some(_) => Ok(()),
            None => Err(EngineError::ModelUnavailable(
                "OPENAI_API_KEY environment variable not set".into(),
            )),
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        reject_blank(texts)?;
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| EngineError::ModelUnavailable("OPENAI_API_KEY not set".into()))?;
        let vectors = with_retry(&self.retry, || self.request(api_key, texts)).await?;
        if vectors.len() != texts.len() {
            return Err(EngineError::ModelUnavailable(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        if let Some(v) = vectors.iter().find(|v| v.len() != self.dims) {
            return Err(EngineError::DimensionMismatch {
                expected: self.dims,
                actual: v.len(),
            });
        }
        Ok(vectors)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let invalid = |what: &str| EngineError::ModelUnavailable(format!("invalid embedding response: {}", what));
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| invalid("missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| invalid("missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        indexed.push((index, vec));
    }
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Local Embedder (fastembed) ============

#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalEmbedder;

#[cfg(feature = "local-embeddings-fastembed")]
mod local {
    use std::sync::{Arc, Mutex, PoisonError};

    use async_trait::async_trait;
    use tracing::info;

    use super::{reject_blank, Embedder};
    use crate::config::EmbeddingConfig;
    use crate::error::{EngineError, Result};

    /// fastembed model, loaded (and downloaded if needed) by `init`.
    pub struct LocalEmbedder {
        model_name: String,
        dims: usize,
        batch_size: usize,
        model: Arc<Mutex<Option<fastembed::TextEmbedding>>>,
    }

    impl LocalEmbedder {
        pub fn new(config: &EmbeddingConfig) -> Result<Self> {
            let model_name = config
                .model
                .clone()
                .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
            to_fastembed_model(&model_name)?;
            Ok(Self {
                model_name,
                dims: config.dims,
                batch_size: config.batch_size,
                model: Arc::new(Mutex::new(None)),
            })
        }
    }

    fn to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
        match name {
            "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
            "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
            "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
            "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
            "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
            other => Err(EngineError::ModelUnavailable(format!(
                "unknown local embedding model '{}'",
                other
            ))),
        }
    }

    #[async_trait]
    impl Embedder for LocalEmbedder {
        fn model_id(&self) -> &str {
            &self.model_name
        }

        fn dims(&self) -> usize {
            self.dims
        }

        async fn init(&self) -> Result<()> {
            let which = to_fastembed_model(&self.model_name)?;
            let slot = self.model.clone();
            tokio::task::spawn_blocking(move || {
                let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
                if guard.is_none() {
                    let model = fastembed::TextEmbedding::try_new(
                        fastembed::InitOptions::new(which).with_show_download_progress(false),
                    )
                    .map_err(|e| EngineError::ModelUnavailable(e.to_string()))?;
                    *guard = Some(model);
                }
                Ok::<_, EngineError>(())
            })
            .await
            .map_err(|e| EngineError::ModelUnavailable(e.to_string()))??;
            info!(model = %self.model_name, "local embedding model loaded");
            Ok(())
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            reject_blank(texts)?;
            let slot = self.model.clone();
            let texts = texts.to_vec();
            let batch_size = self.batch_size;
            tokio::task::spawn_blocking(move || {
                let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
                let model = guard.as_mut().ok_or_else(|| {
                    EngineError::ModelUnavailable("local model not initialized".into())
                })?;
                model
                    .embed(texts, Some(batch_size))
                    .map_err(|e| EngineError::ModelUnavailable(e.to_string()))
            })
            .await
            .map_err(|e| EngineError::ModelUnavailable(e.to_string()))?
        }
    }
}

/// Create the [`Embedder`] named by `config.provider`.
///
/// | Config Value | Embedder |
/// |-------------|----------|
/// | `"hashing"` | [`HashingEmbedder`] |
/// | `"openai"` | [`OpenAiEmbedder`] |
/// | `"local"` | `LocalEmbedder` (feature `local-embeddings-fastembed`) |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "hashing" => Ok(Arc::new(HashingEmbedder::new(config.dims))),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => Err(EngineError::ModelUnavailable(
            "local embeddings require --features local-embeddings-fastembed".into(),
        )),
        other => Err(EngineError::ModelUnavailable(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

// ============ Pool ============

/// Batches texts and embeds them on spawned tasks, at most `workers`
/// batches in flight.
#[derive(Clone)]
pub struct EmbeddingPool {
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    permits: Arc<Semaphore>,
}

impl EmbeddingPool {
    pub fn new(embedder: Arc<dyn Embedder>, batch_size: usize, workers: usize) -> Self {
        Self {
            embedder,
            batch_size: batch_size.max(1),
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Embed every text, returning vectors in input order.
    pub async fn embed_all(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let handles: Vec<_> = texts
            .chunks(self.batch_size)
            .map(|batch| {
                let batch = batch.to_vec();
                let embedder = self.embedder.clone();
                let permits = self.permits.clone();
                tokio::spawn(async move {
                    let _permit = permits.acquire_owned().await.map_err(|_| {
                        EngineError::ModelUnavailable("embedding pool closed".into())
                    })?;
                    embedder.embed_batch(&batch).await
                })
            })
            .collect();
        debug!(texts = texts.len(), batches = handles.len(), "embedding");

        let mut out = Vec::with_capacity(texts.len());
        for joined in join_all(handles).await {
            let vectors = joined
                .map_err(|e| EngineError::ModelUnavailable(format!("embedding task failed: {}", e)))??;
            out.extend(vectors);
        }

        if out.len() != texts.len() {
            return Err(EngineError::ModelUnavailable(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                out.len()
            )));
        }
        let dims = self.embedder.dims();
        if let Some(v) = out.iter().find(|v| v.len() != dims) {
            return Err(EngineError::DimensionMismatch {
                expected: dims,
                actual: v.len(),
            });
        }
        Ok(out)
    }
}

// ============ Vector utilities ============

/// Scale `v` to unit length in place. Zero vectors are left unchanged.
pub fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB produced by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, zero vectors, or vectors of different
/// lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn hashing_is_deterministic_and_normalized() {
        let e = HashingEmbedder::new(64);
        let a = e.embed("The quick brown fox").await.unwrap();
        let b = e.embed("The quick brown fox").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert_eq!(e.model_id(), "hashing-v1-64");
    }

    #[tokio::test]
    async fn hashing_prefers_shared_terms() {
        let e = HashingEmbedder::new(256);
        let q = e.embed("fox jumps").await.unwrap();
        let near = e.embed("the fox jumps over the dog").await.unwrap();
        let far = e.embed("quarterly revenue report").await.unwrap();
        assert!(cosine_similarity(&q, &near) > cosine_similarity(&q, &far));
    }

    #[tokio::test]
    async fn blank_input_is_rejected() {
        let e = HashingEmbedder::new(16);
        assert!(matches!(e.embed("  \t").await, Err(EngineError::EmptyInput)));
        let batch = vec!["ok".to_string(), " ".to_string()];
        assert!(matches!(e.embed_batch(&batch).await, Err(EngineError::EmptyInput)));
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_failures() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let out = with_retry(&fast_policy(3), move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(EngineError::Transient("503".into()))
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_gives_up_as_model_unavailable() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let err = with_retry(&fast_policy(2), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(EngineError::Transient("timeout".into()))
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "model_unavailable");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_errors_are_not_retried() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let err = with_retry(&fast_policy(5), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(EngineError::ModelUnavailable("401".into()))
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "model_unavailable");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = fast_policy(10);
        assert_eq!(p.delay_for(0), Duration::from_millis(1));
        assert_eq!(p.delay_for(3), Duration::from_millis(8));
        assert_eq!(p.delay_for(9), Duration::from_millis(32));
    }

    /// Encodes each text's length so order can be checked.
    struct LengthEmbedder;

    #[async_trait]
    impl Embedder for LengthEmbedder {
        fn model_id(&self) -> &str {
            "length"
        }
        fn dims(&self) -> usize {
            1
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            tokio::task::yield_now().await;
            Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
        }
    }

    #[tokio::test]
    async fn pool_preserves_input_order() {
        let pool = EmbeddingPool::new(Arc::new(LengthEmbedder), 2, 3);
        let texts: Vec<String> = (1..=9).map(|n| "x".repeat(n)).collect();
        let out = pool.embed_all(texts).await.unwrap();
        let lens: Vec<f32> = out.into_iter().map(|v| v[0]).collect();
        assert_eq!(lens, (1..=9).map(|n| n as f32).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn pool_checks_dimensions() {
        let pool = EmbeddingPool::new(Arc::new(HashingEmbedder::new(8)), 4, 1);
        assert!(pool.embed_all(Vec::new()).await.unwrap().is_empty());
        let out = pool.embed_all(vec!["a b".into(), "c".into()]).await.unwrap();
        assert!(out.iter().all(|v| v.len() == 8));
    }

    #[test]
    fn parse_response_orders_by_index() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        });
        let out = parse_openai_response(&json).unwrap();
        assert_eq!(out, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn unknown_provider_is_model_unavailable() {
        let config = EmbeddingConfig {
            provider: "word2vec".into(),
            ..EmbeddingConfig::default()
        };
        let err = create_embedder(&config).err().map(|e| e.kind());
        assert_eq!(err, Some("model_unavailable"));
    }

    #[test]
    fn vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn cosine_edges() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }
}
