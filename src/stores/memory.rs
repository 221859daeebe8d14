//! In-process fallback stores.
//!
//! Used when the durable backend cannot be opened, and in tests. State lives
//! behind `parking_lot` locks; all guarantees are per-process.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::RagError;
use crate::nodes::{Metadata, Node, curate_metadata};

use super::{DocIdFilter, DocumentRef, NodeStore, ScoredId, VectorEntry, VectorIndex};

#[derive(Default)]
struct NodeStoreState {
    nodes: HashMap<String, Node>,
    /// Node ids per document, in document order.
    doc_nodes: HashMap<String, Vec<String>>,
    doc_metadata: HashMap<String, Metadata>,
    /// Document insertion order, for stable listings.
    doc_order: Vec<String>,
}

/// In-memory [`NodeStore`].
#[derive(Default)]
pub struct InMemoryNodeStore {
    state: RwLock<NodeStoreState>,
}

impl InMemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NodeStore for InMemoryNodeStore {
    async fn put_nodes(&self, nodes: Vec<Node>) -> Result<(), RagError> {
        let mut state = self.state.write();
        for node in nodes {
            let doc_id = node.ref_doc_id.clone();
            if !state.doc_nodes.contains_key(&doc_id) {
                state.doc_order.push(doc_id.clone());
                state
                    .doc_metadata
                    .insert(doc_id.clone(), curate_metadata(node.metadata.clone()));
            }
            let ids = state.doc_nodes.entry(doc_id).or_default();
            if !ids.contains(&node.id) {
                ids.push(node.id.clone());
            }
            state.nodes.insert(node.id.clone(), node);
        }
        Ok(())
    }

    async fn get_node(&self, node_id: &str) -> Result<Option<Node>, RagError> {
        Ok(self.state.read().nodes.get(node_id).cloned())
    }

    async fn all_document_refs(&self) -> Result<Vec<DocumentRef>, RagError> {
        let state = self.state.read();
        Ok(state
            .doc_order
            .iter()
            .filter_map(|doc_id| {
                let node_ids = state.doc_nodes.get(doc_id)?.clone();
                Some(DocumentRef {
                    doc_id: doc_id.clone(),
                    node_ids,
                    metadata: state.doc_metadata.get(doc_id).cloned().unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn delete_document_refs(&self, doc_id: &str) -> Result<usize, RagError> {
        let mut state = self.state.write();
        let Some(node_ids) = state.doc_nodes.remove(doc_id) else {
            return Ok(0);
        };
        for node_id in &node_ids {
            state.nodes.remove(node_id);
        }
        state.doc_metadata.remove(doc_id);
        state.doc_order.retain(|id| id != doc_id);
        Ok(node_ids.len())
    }
}

/// In-memory [`VectorIndex`] using exact cosine similarity.
///
/// Scores are cosine similarities in `[-1, 1]`; with the non-negative
/// bag-of-words mock embeddings they stay within `[0, 1]`.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    /// Entries in insertion order; order is the tie-break for equal scores.
    entries: RwLock<Vec<VectorEntry>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, entries: Vec<VectorEntry>) -> Result<(), RagError> {
        let mut state = self.entries.write();
        for entry in entries {
            match state.iter_mut().find(|existing| existing.node_id == entry.node_id) {
                Some(existing) => *existing = entry,
                None => state.push(entry),
            }
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&DocIdFilter>,
    ) -> Result<Vec<ScoredId>, RagError> {
        let state = self.entries.read();
        let mut scored: Vec<ScoredId> = state
            .iter()
            .filter(|entry| filter.is_none_or(|f| f.matches(&entry.doc_id)))
            .map(|entry| ScoredId {
                node_id: entry.node_id.clone(),
                score: cosine_similarity(query, &entry.embedding),
            })
            .collect();
        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete_by_doc_id(&self, doc_id: &str) -> Result<usize, RagError> {
        let mut state = self.entries.write();
        let before = state.len();
        state.retain(|entry| entry.doc_id != doc_id);
        Ok(before - state.len())
    }

    async fn close(&self) -> Result<(), RagError> {
        Ok(())
    }
}
