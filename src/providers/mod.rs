//! Capability providers: embedding models and language models.
//!
//! Providers are polymorphic interfaces with a small closed set of
//! implementing variants (remote HTTP API, deterministic mock) selected by
//! configuration. They are constructed once at startup and shared via `Arc`
//! across concurrent requests.

pub mod embedding;
pub mod llm;

pub use embedding::{EmbeddingProvider, MockEmbedder, OllamaEmbedder, embedding_provider};
pub use llm::{ChatPrompt, LanguageModel, MockLanguageModel, OllamaChatModel, language_model};
