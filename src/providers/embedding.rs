//! Embedding providers: text to fixed-dimension vectors.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::{EmbeddingConfig, ProviderMode};
use crate::error::RagError;

/// Converts text into fixed-dimension numeric vectors.
///
/// Implementations must be deterministic for identical input within a
/// process lifetime; the pipeline embeds each node's window text exactly
/// once at ingestion time.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let input = [text.to_string()];
        let mut vectors = self.embed_batch(&input).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::ProviderUnavailable("empty embedding response".into()))
    }

    /// Dimension of every vector this provider produces.
    fn dimensions(&self) -> usize;
}

/// Construct the embedding provider selected by configuration.
pub fn embedding_provider(config: &EmbeddingConfig) -> Arc<dyn EmbeddingProvider> {
    match config.mode {
        ProviderMode::Ollama => {
            tracing::info!(model = %config.model, api_base = %config.api_base, "using remote embedding provider");
            Arc::new(OllamaEmbedder::new(config.clone()))
        }
        ProviderMode::Mock => Arc::new(MockEmbedder::new(config.dimensions)),
    }
}

/// Deterministic in-process embedder for tests and offline development.
///
/// Hashes each lowercase word of the input into a bucket of the output
/// vector and L2-normalizes the result, so cosine similarity between two
/// embeddings tracks their word overlap. Identical text always produces an
/// identical vector.
#[derive(Clone, Debug)]
pub struct MockEmbedder {
    dimensions: usize,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Remote embedding provider speaking the Ollama `/api/embed` protocol.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    config: EmbeddingConfig,
}

impl OllamaEmbedder {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/api/embed", self.config.api_base.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&json!({ "model": self.config.model, "input": texts }))
            .send()
            .await
            .map_err(|err| RagError::ProviderUnavailable(err.to_string()))?;

        if !response.status().is_success() {
            return Err(RagError::ProviderUnavailable(format!(
                "embedding backend returned {}",
                response.status()
            )));
        }

        let parsed: OllamaEmbedResponse = response
            .json()
            .await
            .map_err(|err| RagError::ProviderUnavailable(err.to_string()))?;

        if parsed.embeddings.len() != texts.len() {
            return Err(RagError::ProviderUnavailable(format!(
                "embedding backend returned {} vectors for {} inputs",
                parsed.embeddings.len(),
                texts.len()
            )));
        }
        Ok(parsed.embeddings)
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }
}
