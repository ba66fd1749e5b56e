use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub db: DbConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub vector_index: VectorIndexConfig,
    pub lexical: LexicalConfig,
    pub retrieval: RetrievalConfig,
    pub reader: ReaderConfig,
    pub server: ServerConfig,
    pub connectors: ConnectorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/minecollect.sqlite"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StrategyName {
    #[default]
    Paragraph,
    Window,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    pub strategy: StrategyName,
    /// Paragraph strategy budget, approximated as 4 bytes per token.
    pub max_tokens: usize,
    /// Words per chunk for the window strategy.
    pub window_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyName::Paragraph,
            max_tokens: 200,
            window_tokens: 128,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Override for the OpenAI-compatible endpoint URL.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Embedding batches in flight at once.
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: default_dims(),
            endpoint: None,
            batch_size: default_batch_size(),
            workers: default_workers(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "hashing".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_batch_size() -> usize {
    32
}
fn default_workers() -> usize {
    2
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VectorIndexConfig {
    pub partitions: usize,
    pub probes: usize,
    pub kmeans_iterations: usize,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            partitions: 16,
            probes: 4,
            kmeans_iterations: 8,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LexicalConfig {
    pub k1: f64,
    pub b: f64,
    /// Drop common English stopwords when indexing and querying.
    pub stopwords: bool,
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            stopwords: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub semantic_weight: f64,
    /// Chunks retrieved per question.
    pub top_k: usize,
    /// Default result count for search and similar.
    pub search_limit: usize,
    /// Each sub-index returns `k * overfetch` candidates before fusion.
    pub overfetch: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            semantic_weight: 0.7,
            top_k: 10,
            search_limit: 10,
            overfetch: 4,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReaderConfig {
    pub max_answers: usize,
    pub answers_per_chunk: usize,
    pub max_span_tokens: usize,
    /// Characters of chunk text shown in source previews.
    pub preview_chars: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_answers: 3,
            answers_per_chunk: 1,
            max_span_tokens: 3,
            preview_chars: 200,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:7341".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConnectorsConfig {
    pub filesystem: Option<FilesystemConnectorConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilesystemConnectorConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl FilesystemConnectorConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_include_globs() -> Vec<String> {
    [
        "txt", "text", "md", "markdown", "html", "htm", "pdf", "docx", "pptx", "xlsx", "odt",
    ]
    .iter()
    .map(|ext| format!("**/*.{}", ext))
    .collect()
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        // Validate chunking
        if self.chunking.max_tokens == 0 {
            anyhow::bail!("chunking.max_tokens must be > 0");
        }
        if self.chunking.window_tokens == 0 {
            anyhow::bail!("chunking.window_tokens must be > 0");
        }

        // Validate embedding
        if self.embedding.dims == 0 {
            anyhow::bail!("embedding.dims must be > 0");
        }
        if self.embedding.batch_size == 0 || self.embedding.workers == 0 {
            anyhow::bail!("embedding.batch_size and embedding.workers must be >= 1");
        }
        match self.embedding.provider.as_str() {
            "hashing" | "openai" | "local" => {}
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be hashing, openai, or local.",
                other
            ),
        }

        // Validate vector index
        if self.vector_index.partitions == 0 {
            anyhow::bail!("vector_index.partitions must be >= 1");
        }
        if self.vector_index.probes == 0 {
            anyhow::bail!("vector_index.probes must be >= 1");
        }

        // Validate retrieval
        if !(0.0..=1.0).contains(&self.retrieval.semantic_weight) {
            anyhow::bail!("retrieval.semantic_weight must be in [0.0, 1.0]");
        }
        if self.retrieval.top_k == 0 || self.retrieval.search_limit == 0 {
            anyhow::bail!("retrieval.top_k and retrieval.search_limit must be >= 1");
        }
        if self.retrieval.overfetch == 0 {
            anyhow::bail!("retrieval.overfetch must be >= 1");
        }

        // Validate reader
        if self.reader.max_answers == 0 {
            anyhow::bail!("reader.max_answers must be >= 1");
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.retrieval.semantic_weight, 0.7);
        assert_eq!(config.reader.max_answers, 3);
        assert_eq!(config.embedding.provider, "hashing");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [db]
            path = "/tmp/x.sqlite"

            [chunking]
            strategy = "window"
            window_tokens = 64

            [retrieval]
            semantic_weight = 0.25
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.chunking.strategy, StrategyName::Window);
        assert_eq!(config.chunking.max_tokens, 200);
        assert_eq!(config.retrieval.top_k, 10);
        assert_eq!(config.embedding.dims, 384);
    }

    #[test]
    fn default_include_globs_are_distinct() {
        let globs = default_include_globs();
        let distinct: std::collections::HashSet<_> = globs.iter().collect();
        assert_eq!(distinct.len(), globs.len());
        assert_eq!(globs.len(), 11);
    }

    #[test]
    fn rejects_out_of_range_weight() {
        let mut config = Config::default();
        config.retrieval.semantic_weight = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_provider() {
        let mut config = Config::default();
        config.embedding.provider = "magic".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_config_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("minecollect.toml");
        std::fs::write(
            &path,
            "[vector_index]\npartitions = 0\n",
        )
        .unwrap();
        assert!(load_config(&path).is_err());
        std::fs::write(
            &path,
            "[connectors.filesystem]\nroot = \"./notes\"\n",
        )
        .unwrap();
        let config = load_config(&path).unwrap();
        let fs = config.connectors.filesystem.unwrap();
        assert!(fs.include_globs.contains(&"**/*.md".to_string()));
    }
}
