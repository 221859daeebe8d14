//! Configuration for the pipeline, stores, and providers.
//!
//! All components are configured up front through [`RagmillConfig`] and its
//! sub-configs; request handlers receive fully constructed components and
//! never consult configuration themselves. Defaults aim at a small local
//! deployment; [`RagmillConfig::from_env`] overlays environment variables
//! (loading a `.env` file first via `dotenvy` when present).

use serde::{Deserialize, Serialize};

/// Top-level configuration assembled at process startup.
#[derive(Clone, Debug, Default)]
pub struct RagmillConfig {
    pub ingestion: IngestionConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub store: StoreConfig,
}

impl RagmillConfig {
    /// Build a configuration from environment variables, falling back to the
    /// defaults for anything unset.
    ///
    /// Recognized variables: `RAGMILL_DB_PATH`, `RAGMILL_INGEST_MODE`
    /// (`simple`|`batch`|`parallel`), `RAGMILL_EMBEDDING_MODE` and
    /// `RAGMILL_LLM_MODE` (`ollama`|`mock`), `OLLAMA_API_BASE`,
    /// `RAGMILL_EMBEDDING_MODEL`, `RAGMILL_LLM_MODEL`.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();

        if let Ok(path) = std::env::var("RAGMILL_DB_PATH") {
            config.store.db_path = path;
        }
        if let Ok(mode) = std::env::var("RAGMILL_INGEST_MODE") {
            config.ingestion.mode = match mode.as_str() {
                "batch" => IngestMode::Batch,
                "parallel" => IngestMode::Parallel,
                _ => IngestMode::Simple,
            };
        }
        if let Ok(mode) = std::env::var("RAGMILL_EMBEDDING_MODE") {
            config.embedding.mode = ProviderMode::parse(&mode);
        }
        if let Ok(mode) = std::env::var("RAGMILL_LLM_MODE") {
            config.llm.mode = ProviderMode::parse(&mode);
        }
        if let Ok(base) = std::env::var("OLLAMA_API_BASE") {
            config.embedding.api_base = base.clone();
            config.llm.api_base = base;
        }
        if let Ok(model) = std::env::var("RAGMILL_EMBEDDING_MODEL") {
            config.embedding.model = model;
        }
        if let Ok(model) = std::env::var("RAGMILL_LLM_MODEL") {
            config.llm.model = model;
        }

        config
    }
}

/// Execution policy for document ingestion.
///
/// All three policies produce an identical resulting index state for
/// identical input; they differ only in throughput and resource usage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestMode {
    /// One document fully processed before the next starts. Deterministic,
    /// minimal resource usage.
    Simple,
    /// All documents chunked first, then embedded in provider-sized batches.
    Batch,
    /// Documents processed concurrently up to the configured worker count.
    Parallel,
}

/// Ingestion pipeline settings.
#[derive(Clone, Debug)]
pub struct IngestionConfig {
    pub mode: IngestMode,
    /// Embedding texts per provider call under the `Batch` policy.
    pub batch_size: usize,
    /// Concurrent document workers under the `Parallel` policy.
    pub workers: usize,
    /// Abort a bulk ingest on the first failing document instead of
    /// isolating the failure to that document.
    pub fail_fast: bool,
    /// Sentences of surrounding context on each side of a chunk's sentence.
    pub window_size: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            mode: IngestMode::Simple,
            batch_size: 32,
            workers: 4,
            fail_fast: false,
            window_size: 3,
        }
    }
}

/// Retrieval and context-assembly settings used by the chat orchestrator.
#[derive(Clone, Debug)]
pub struct RetrievalConfig {
    /// Nearest-neighbor hits requested from the vector index.
    pub similarity_top_k: usize,
    /// Hits scoring below this cosine similarity are dropped before any
    /// reranking. `None` disables the cutoff.
    pub similarity_cutoff: Option<f32>,
    pub rerank: RerankConfig,
    /// When the vector index fails mid-retrieval, answer without context
    /// (empty sources) instead of propagating the error.
    pub degrade_to_simple: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_top_k: 4,
            similarity_cutoff: None,
            rerank: RerankConfig::default(),
            degrade_to_simple: false,
        }
    }
}

/// Optional second-pass reranking of retrieved chunks.
#[derive(Clone, Debug)]
pub struct RerankConfig {
    pub enabled: bool,
    /// Survivors kept after reranking.
    pub top_n: usize,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            top_n: 2,
        }
    }
}

/// Which implementation backs a capability provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderMode {
    /// Remote HTTP API (Ollama-compatible).
    Ollama,
    /// Deterministic in-process mock, for tests and offline development.
    Mock,
}

impl ProviderMode {
    fn parse(raw: &str) -> Self {
        match raw {
            "ollama" => ProviderMode::Ollama,
            _ => ProviderMode::Mock,
        }
    }
}

/// Embedding provider settings.
#[derive(Clone, Debug)]
pub struct EmbeddingConfig {
    pub mode: ProviderMode,
    pub api_base: String,
    pub model: String,
    /// Vector dimension produced by the model.
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            mode: ProviderMode::Mock,
            api_base: "http://localhost:11434".to_string(),
            model: "bge-small-en-v1.5".to_string(),
            dimensions: 384,
        }
    }
}

/// Language model provider settings.
#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub mode: ProviderMode,
    pub api_base: String,
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            mode: ProviderMode::Mock,
            api_base: "http://localhost:11434".to_string(),
            model: "mistral:7b-instruct".to_string(),
        }
    }
}

/// Store backend settings.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Path of the durable SQLite database. Construction attempts this
    /// backend first and falls back to in-memory stores when it cannot be
    /// opened.
    pub db_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: "ragmill.db".to_string(),
        }
    }
}
