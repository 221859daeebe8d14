//! # ragmill
//!
//! A retrieval-augmented generation backend: document ingestion, sentence-
//! window chunking, vector retrieval with sibling-context expansion, and a
//! chat orchestrator that grounds language-model answers on retrieved
//! context.
//!
//! ```text
//!   documents                 queries / chat turns
//!       |                             |
//!       v                             v
//!  +-----------+   nodes    +-----------------+
//!  |  ingest   | ---------> |    retriever    |
//!  | pipeline  |  vectors   |  (+ reranker)   |
//!  +-----------+            +-----------------+
//!       |                             |
//!       v                             v
//!  +-----------------------+   +-------------+
//!  | node store + vector   |   |    chat     | --> completions
//!  | index (sqlite/memory) |   |   service   |     (full or streamed)
//!  +-----------------------+   +-------------+
//! ```
//!
//! ## Layers
//!
//! - [`nodes`] — documents, sentence-window chunk nodes, and the
//!   response-shaped entities ([`nodes::IngestedDoc`],
//!   [`nodes::RetrievedChunk`]).
//! - [`ingestion`] — chunking, embedding, and atomic persistence under
//!   three execution policies.
//! - [`retriever`] — vector search, node hydration, sibling walks, and the
//!   [`retriever::Reranker`] seam.
//! - [`chat`] — turn-list parsing and grounded/simple chat with streaming.
//! - [`providers`] — embedding and language-model backends (Ollama or
//!   deterministic mocks).
//! - [`stores`] — the [`stores::NodeStore`] / [`stores::VectorIndex`] traits
//!   with durable SQLite and in-memory implementations.
//! - [`config`] — startup configuration with environment overlays.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use ragmill::chat::ChatService;
//! use ragmill::config::RagmillConfig;
//! use ragmill::ingestion::IngestPipeline;
//! use ragmill::message::ChatTurn;
//! use ragmill::providers::{embedding_provider, language_model};
//! use ragmill::retriever::{ContextFilter, Retriever};
//! use ragmill::stores::open_stores;
//!
//! # async fn run() -> Result<(), ragmill::RagError> {
//! let config = RagmillConfig::from_env();
//! let stores = open_stores(&config.store).await;
//! let embedder = embedding_provider(&config.embedding);
//!
//! let pipeline = IngestPipeline::new(
//!     embedder.clone(),
//!     stores.node_store.clone(),
//!     stores.vector_index.clone(),
//!     config.ingestion.clone(),
//! );
//! pipeline.ingest("notes.txt", "Shipping resumes Monday. Stock is low.").await?;
//!
//! let retriever = Arc::new(Retriever::new(
//!     embedder,
//!     stores.node_store.clone(),
//!     stores.vector_index.clone(),
//! ));
//! let chat = ChatService::new(
//!     language_model(&config.llm),
//!     retriever,
//!     None,
//!     config.retrieval.clone(),
//! );
//! let completion = chat
//!     .chat(
//!         vec![ChatTurn::user("when does shipping resume?")],
//!         true,
//!         &ContextFilter::default(),
//!     )
//!     .await?;
//! println!("{}", completion.response);
//! # Ok(())
//! # }
//! ```

pub mod chat;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod message;
pub mod nodes;
pub mod providers;
pub mod retriever;
pub mod stores;

pub use chat::{ChatEngineInput, ChatService, Completion, StreamingCompletion};
pub use config::RagmillConfig;
pub use error::RagError;
pub use ingestion::IngestPipeline;
pub use message::ChatTurn;
pub use nodes::{Document, IngestedDoc, Node, RetrievedChunk};
pub use retriever::{ContextFilter, Retriever, ScoredNode};
