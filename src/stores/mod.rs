//! Storage backends for chunk nodes and their embeddings.
//!
//! Two polymorphic stores back the pipeline:
//!
//! - [`NodeStore`] persists chunk [`Node`]s and per-document chunk links.
//! - [`VectorIndex`] persists `(node_id, embedding, metadata)` entries and
//!   answers nearest-neighbor queries with optional doc-id filtering.
//!
//! Each has a durable SQLite implementation ([`sqlite`]) and an in-process
//! implementation ([`memory`]). [`open_stores`] attempts the durable backend
//! first and downgrades to in-memory on a connectivity failure; the decision
//! is made exactly once per process and the chosen variant is then used
//! uniformly behind `Arc<dyn …>`. Callers never need to know which backend
//! is active.

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::StoreConfig;
use crate::error::RagError;
use crate::nodes::{Metadata, Node};

pub use memory::{InMemoryNodeStore, InMemoryVectorIndex};
pub use sqlite::{SqliteNodeStore, SqliteVectorIndex};

/// Per-document view over the node store: the document's node ids in
/// document order, plus its metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DocumentRef {
    pub doc_id: String,
    pub node_ids: Vec<String>,
    pub metadata: Metadata,
}

/// An embedding entry ready for the vector index.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VectorEntry {
    pub node_id: String,
    pub doc_id: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
}

/// A search hit: node id plus similarity score (higher is more relevant).
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredId {
    pub node_id: String,
    pub score: f32,
}

/// OR-combination of per-document-id equality filters on the `doc_id`
/// field. An absent filter means unrestricted search.
#[derive(Clone, Debug, Default)]
pub struct DocIdFilter {
    pub doc_ids: Vec<String>,
}

impl DocIdFilter {
    pub fn new(doc_ids: Vec<String>) -> Self {
        Self { doc_ids }
    }

    pub fn matches(&self, doc_id: &str) -> bool {
        self.doc_ids.iter().any(|candidate| candidate == doc_id)
    }
}

/// Persists chunk nodes and per-document chunk-link metadata.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Upsert nodes, registering their owning documents. Last writer wins
    /// per node id.
    async fn put_nodes(&self, nodes: Vec<Node>) -> Result<(), RagError>;

    /// Fetch a node by id, `None` when unknown.
    async fn get_node(&self, node_id: &str) -> Result<Option<Node>, RagError>;

    /// All currently stored documents with their node ids and metadata.
    async fn all_document_refs(&self) -> Result<Vec<DocumentRef>, RagError>;

    /// Remove a document's nodes and its ref entry, returning the number of
    /// nodes deleted (0 when the document was unknown).
    async fn delete_document_refs(&self, doc_id: &str) -> Result<usize, RagError>;
}

/// Persists embeddings and answers nearest-neighbor queries.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Upsert entries keyed by node id. Last writer wins.
    async fn upsert(&self, entries: Vec<VectorEntry>) -> Result<(), RagError>;

    /// Nearest-neighbor search, descending by score, ties broken by
    /// insertion order. Scores are cosine similarities; see each
    /// implementation for the exact range.
    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&DocIdFilter>,
    ) -> Result<Vec<ScoredId>, RagError>;

    /// Remove every entry whose owning document matches, returning the
    /// number removed.
    async fn delete_by_doc_id(&self, doc_id: &str) -> Result<usize, RagError>;

    /// Release backend resources. Further calls through any handle may fail.
    async fn close(&self) -> Result<(), RagError>;
}

/// Which backend [`open_stores`] ended up with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// The durable SQLite backend at the configured path.
    Durable,
    /// The in-process fallback.
    InMemory,
}

/// The store handles shared across the process, tagged with the backend
/// decision made at construction.
#[derive(Clone)]
pub struct StoreHandles {
    pub node_store: Arc<dyn NodeStore>,
    pub vector_index: Arc<dyn VectorIndex>,
    pub backend: BackendKind,
}

/// Open the node store and vector index, attempting the durable backend
/// first and falling back to in-process stores on a connectivity failure.
///
/// The downgrade is logged and final: this function is meant to be called
/// once at startup, and the returned handles are shared for the process
/// lifetime.
pub async fn open_stores(config: &StoreConfig) -> StoreHandles {
    match sqlite::open(&config.db_path).await {
        Ok((node_store, vector_index)) => {
            tracing::info!(path = %config.db_path, "opened durable stores");
            StoreHandles {
                node_store: Arc::new(node_store),
                vector_index: Arc::new(vector_index),
                backend: BackendKind::Durable,
            }
        }
        Err(err) => {
            tracing::warn!(
                path = %config.db_path,
                error = %err,
                "durable store unavailable, falling back to in-memory stores"
            );
            StoreHandles {
                node_store: Arc::new(InMemoryNodeStore::new()),
                vector_index: Arc::new(InMemoryVectorIndex::new()),
                backend: BackendKind::InMemory,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_matches_named_docs_only() {
        let filter = DocIdFilter::new(vec!["a".into(), "b".into()]);
        assert!(filter.matches("a"));
        assert!(filter.matches("b"));
        assert!(!filter.matches("c"));
    }
}
