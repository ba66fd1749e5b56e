//! Wires the store, indexes, embedder, and reader into one engine.
//!
//! [`Pipeline::open`] is the production path: a SQLite store and indexes
//! rebuilt from it. [`Pipeline::in_memory`] takes injected components and
//! backs everything with [`InMemoryChunkStore`].

use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tracing::info;

use crate::config::Config;
use crate::embedding::{create_embedder, Embedder, EmbeddingPool};
use crate::error::Result;
use crate::indexer::Indexer;
use crate::lexical_index::{LexicalIndex, LexicalIndexStats};
use crate::normalize::Normalizer;
use crate::orchestrator::{QaDefaults, QaOrchestrator};
use crate::reader::{Reader, SpanReader};
use crate::retriever::HybridRetriever;
use crate::store::{ChunkStore, InMemoryChunkStore, SqliteChunkStore};
use crate::vector_index::{VectorIndex, VectorIndexStats};

#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    pub embedder: String,
    pub reader: String,
    pub vector: VectorIndexStats,
    pub lexical: LexicalIndexStats,
}

pub struct Pipeline {
    pub indexer: Arc<Indexer>,
    pub orchestrator: Arc<QaOrchestrator>,
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn Embedder>,
    reader: Arc<dyn Reader>,
    vectors: Arc<VectorIndex>,
    lexical: Arc<LexicalIndex>,
}

impl Pipeline {
    /// Open the SQLite store at `config.db.path`, load the models, and
    /// rebuild both indexes from stored chunks.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let pool = crate::db::connect(&config.db).await?;
        crate::migrate::run_migrations(&pool).await?;
        let store: Arc<dyn ChunkStore> = Arc::new(SqliteChunkStore::new(pool));

        let embedder = create_embedder(&config.embedding)?;
        let reader: Arc<dyn Reader> = Arc::new(SpanReader::from_config(&config.reader));

        let pipeline = Self::assemble(config, store, embedder, reader)?;
        pipeline.init().await.context("loading models")?;
        let report = pipeline.indexer.rebuild().await?;
        info!(
            db = %config.db.path.display(),
            chunks = report.chunks,
            "pipeline ready"
        );
        Ok(pipeline)
    }

    /// An engine over an in-memory store. Models are initialized here.
    pub async fn in_memory(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        reader: Arc<dyn Reader>,
    ) -> Result<Self> {
        let store: Arc<dyn ChunkStore> = Arc::new(InMemoryChunkStore::new());
        let pipeline = Self::assemble(config, store, embedder, reader)?;
        pipeline.init().await?;
        Ok(pipeline)
    }

    fn assemble(
        config: &Config,
        store: Arc<dyn ChunkStore>,
        embedder: Arc<dyn Embedder>,
        reader: Arc<dyn Reader>,
    ) -> Result<Self> {
        let vectors = Arc::new(VectorIndex::from_config(
            embedder.model_id(),
            embedder.dims(),
            &config.vector_index,
        ));
        let lexical = Arc::new(LexicalIndex::from_config(&config.lexical));

        let pool = EmbeddingPool::new(
            embedder.clone(),
            config.embedding.batch_size,
            config.embedding.workers,
        );
        let indexer = Arc::new(Indexer::new(
            Normalizer::from_config(&config.chunking),
            pool,
            store.clone(),
            vectors.clone(),
            lexical.clone(),
        ));

        let retriever = Arc::new(HybridRetriever::new(
            embedder.clone(),
            vectors.clone(),
            lexical.clone(),
            config.retrieval.overfetch,
        )?);
        let orchestrator = Arc::new(QaOrchestrator::new(
            retriever,
            reader.clone(),
            store.clone(),
            QaDefaults::from(config),
        ));

        Ok(Self {
            indexer,
            orchestrator,
            store,
            embedder,
            reader,
            vectors,
            lexical,
        })
    }

    async fn init(&self) -> Result<()> {
        self.embedder.init().await?;
        self.reader.init().await
    }

    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn vectors(&self) -> &Arc<VectorIndex> {
        &self.vectors
    }

    pub fn lexical(&self) -> &Arc<LexicalIndex> {
        &self.lexical
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            embedder: self.embedder.model_id().to_string(),
            reader: self.reader.model_id().to_string(),
            vector: self.vectors.stats(),
            lexical: self.lexical.stats(),
        }
    }
}
